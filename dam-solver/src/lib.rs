#![warn(missing_docs)]
//! Reference implementations of the two clearing capabilities a day-ahead
//! market engine depends on.
//!
//! - [`CallMarket`](dam_core::ports::CallMarket): a single area's 24-hour
//!   double auction over hourly and block bids. Blocks are relaxed, rounded to
//!   all-or-nothing and paradoxically accepted blocks are removed one at a time.
//! - [`Allocator`](dam_core::ports::Allocator): one hour of welfare-maximizing
//!   allocation across coupled areas, subject to interconnection capacities.
//!
//! Both are formulated as linear programs and handed to a third-party convex
//! solver. Clarabel is enabled by default; OSQP is available behind the `osqp`
//! feature. Acceptance is redistributed in exact merit order after every solve,
//! so ties never depend on solver internals.

use thiserror::Error;

mod allocation;
pub use allocation::{FLOW_COST, allocate};

mod clearing;
pub use clearing::{PARADOX_TOLERANCE, clear_call_market};

mod merit;
pub use merit::fill_in_merit_order;

mod program;
pub use program::{Column, LinearProgram, LpBackend, LpSolution};

/**
 * These are the solver backends.
 */
mod impls;
pub use impls::*;

/// The ways a backend can fail to produce a solution
#[derive(Debug, Error)]
pub enum SolverError {
    /// The backend rejected the problem data
    #[error("{backend}: unable to set up problem: {reason}")]
    Setup {
        /// The backend name
        backend: &'static str,
        /// The backend's explanation
        reason: String,
    },
    /// The backend terminated without an acceptable solution
    #[error("{backend}: no solution ({status})")]
    NotSolved {
        /// The backend name
        backend: &'static str,
        /// The termination status reported by the backend
        status: String,
    },
}

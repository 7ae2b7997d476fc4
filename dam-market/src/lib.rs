#![warn(missing_docs)]
//! The day-ahead market engine.
//!
//! Each [`AreaAuction`] gathers and validates its participants' bids. The
//! [`CouplingOptimizer`] runs the areas through a simulated day: it refreshes
//! the exchange and storage forecasts, lets every area collect bids, allocates
//! each hour across the coupled areas under the interconnection capacities and
//! falls back to independent clearing whenever the coupled allocation cannot
//! be committed. All per-phase work runs as independent tasks on an injected
//! [`Executor`].

use dam_core::models::AreaId;
use thiserror::Error;

mod auction;
pub use auction::{AreaAuction, AuctionState, PRICE_TOLERANCE};

mod coupling;
pub use coupling::{Capabilities, CouplingError, CouplingOptimizer, DayReport, Phase};

mod executor;
pub use executor::{Executor, ExecutorError, PhaseRunner};

mod simulation;
pub use simulation::{Simulation, SimulationError};

/// Errors that abort a simulated day
#[derive(Debug, Error)]
pub enum MarketError {
    /// Local clearing of an area failed
    #[error("call market failed for area {area}: {source}")]
    CallMarket {
        /// The area being cleared
        area: AreaId,
        /// The call market's error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// An area id that was never registered
    #[error("unknown area {0}")]
    UnknownArea(AreaId),
    /// An area id registered twice
    #[error("duplicate area {0}")]
    DuplicateArea(AreaId),
    /// The worker pool failed
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

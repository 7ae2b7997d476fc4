#![warn(missing_docs)]
//! Models and ports for simulating day-ahead electricity markets.
//!
//! A day-ahead market clears 24 hourly products (and multi-hour block
//! products) one day before delivery. Several market areas may be coupled,
//! in which case their auctions are cleared jointly subject to the transfer
//! capacity of the interconnectors between them.
//!
//! This crate contains no clearing logic of its own. It defines the shared
//! vocabulary (bids, areas, clearing results, flow matrices) and the traits
//! through which the engine talks to participants, solvers and input data.

/// Core domain models.
///
/// The models are plain data with the minimal amount of behavior needed to
/// keep their invariants: bid validation and ordering, flow netting, and
/// forecast addressing.
pub mod models;

/// Interface traits for the collaborators of the clearing engine.
///
/// These are the "ports" of a hexagonal architecture: participants that
/// submit bids, the call-market and allocation capabilities that solve the
/// optimization problems, and the read-only providers of capacities and
/// residual demand.
pub mod ports;

#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod cli;
pub use cli::{Cli, Commands};

mod config;
pub use config::{AppConfig, SimulationConfig};

mod io;
pub use io::PathOrStd;

pub mod participants;

pub mod scenario;

mod solver;
pub use solver::SolverLib;

//! Command-line interface definition and dispatch.

use crate::{AppConfig, PathOrStd, SolverLib};
use clap::{Parser, Subcommand};
use dam_market::Executor;
use std::{io::Write as _, path::PathBuf};
use tracing::{Level, event};

/// Command-line arguments for the market simulator.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The action to perform
    #[command(subcommand)]
    pub command: Commands,
}

/// The available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate a scenario and write one JSON report per day
    Run {
        /// Path to the scenario file
        #[arg(short, long, env = "DAMSIM_CONFIG")]
        config: Option<PathBuf>,

        /// Number of days to simulate, overriding the scenario
        #[arg(short, long)]
        days: Option<usize>,

        /// Request a specific LP solver
        #[arg(short, long, default_value = "clarabel")]
        lib: SolverLib,

        /// The output file ("-" implies stdout)
        #[arg(short, long, default_value = "-", value_parser = clap::value_parser!(PathOrStd))]
        output: PathOrStd,
    },

    /// Print the fully layered configuration as JSON
    Config {
        /// Path to the scenario file
        #[arg(short, long, env = "DAMSIM_CONFIG")]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command-line arguments.
    pub fn import() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Execute the selected subcommand
    pub fn evaluate(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Run {
                config,
                days,
                lib,
                output,
            } => {
                let mut app = AppConfig::load(config.as_deref())?;
                if let Some(days) = days {
                    app.simulation.days = days;
                }

                let executor = Executor::new(app.market.cores)?;
                event!(
                    Level::INFO,
                    cores = executor.cores(),
                    days = app.simulation.days,
                    solver = ?lib,
                    "starting simulation"
                );
                let mut output = output.write()?;
                let result = lib.simulate(&executor, &app, &mut output);
                executor.shutdown();
                result?;
                output.flush()?;
            }
            Commands::Config { config } => {
                let app = AppConfig::load(config.as_deref())?;
                let mut output = std::io::stdout().lock();
                serde_json::to_writer_pretty(&mut output, &app)?;
                writeln!(output)?;
            }
        }
        Ok(())
    }
}

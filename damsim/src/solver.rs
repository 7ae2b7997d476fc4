use crate::{AppConfig, participants::Registry};
use clap::ValueEnum;
use dam_core::ports::{Allocator, CallMarket};
use dam_market::{Capabilities, CouplingOptimizer, DayReport, Executor, Simulation};
use dam_solver::{clarabel::ClarabelSolver, osqp::OsqpSolver};
use std::io::Write;
use tracing::{Level, event};

/// The LP backends available to the engine
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SolverLib {
    /// The Clarabel interior-point solver
    Clarabel,
    /// The OSQP operator-splitting solver
    Osqp,
}

impl SolverLib {
    /// Simulate the configured days with this backend, writing each day's
    /// report to `output` as a line of JSON
    pub fn simulate(
        self,
        executor: &Executor,
        config: &AppConfig,
        output: &mut dyn Write,
    ) -> anyhow::Result<()> {
        match self {
            SolverLib::Clarabel => simulate::<ClarabelSolver>(executor, config, output),
            SolverLib::Osqp => simulate::<OsqpSolver>(executor, config, output),
        }
    }
}

fn simulate<S>(executor: &Executor, config: &AppConfig, output: &mut dyn Write) -> anyhow::Result<()>
where
    S: Allocator + CallMarket + Default + 'static,
{
    let world = config.scenario.build(&Registry)?;
    let start = config.simulation.start;

    let capabilities = Capabilities {
        allocator: S::default(),
        market: S::default(),
        capacities: world.capacities,
        outlook: world.outlook,
    };
    let mut optimizer = CouplingOptimizer::new(
        config.market.clone(),
        executor.runner(),
        capabilities,
        world.areas,
        start,
    )?;
    for (area, participant) in world.participants {
        optimizer.add_participant(&area, participant)?;
    }

    let mut simulation = Simulation::new(optimizer, start);
    let mut fallbacks = 0;
    let sink = |report: DayReport| -> std::io::Result<()> {
        if report.fallback.is_some() {
            fallbacks += 1;
        }
        serde_json::to_writer(&mut *output, &report)?;
        writeln!(output)
    };
    executor.block_on(simulation.run(config.simulation.days, sink))?;

    event!(
        Level::INFO,
        days = config.simulation.days,
        fallbacks,
        "simulation finished"
    );
    Ok(())
}

use crate::{CouplingOptimizer, DayReport, MarketError};
use dam_core::{
    models::Day,
    ports::{Allocator, CallMarket},
};
use tracing::{Level, event};

/// Drives a [`CouplingOptimizer`] through consecutive days.
pub struct Simulation<A, C> {
    optimizer: CouplingOptimizer<A, C>,
    next: Day,
}

impl<A, C> Simulation<A, C>
where
    A: Allocator + 'static,
    C: CallMarket + 'static,
{
    /// A simulation whose first day is `start`
    pub fn new(optimizer: CouplingOptimizer<A, C>, start: Day) -> Self {
        Self {
            optimizer,
            next: start,
        }
    }

    /// The engine
    pub fn optimizer(&self) -> &CouplingOptimizer<A, C> {
        &self.optimizer
    }

    /// Mutable access to the engine, e.g. to register participants
    pub fn optimizer_mut(&mut self) -> &mut CouplingOptimizer<A, C> {
        &mut self.optimizer
    }

    /// The next day to be simulated
    pub fn next_day(&self) -> Day {
        self.next
    }

    /// Simulate the next day
    pub async fn step(&mut self) -> Result<DayReport, MarketError> {
        let report = self.optimizer.run_day(self.next).await?;
        self.next = self.next.next();
        Ok(report)
    }

    /// Simulate `days` consecutive days, handing each report to `sink` as
    /// soon as the day has settled.
    pub async fn run<E>(
        &mut self,
        days: usize,
        mut sink: impl FnMut(DayReport) -> Result<(), E>,
    ) -> Result<(), SimulationError<E>> {
        for _ in 0..days {
            let report = self.step().await.map_err(SimulationError::Market)?;
            if !report.coupled && !self.optimizer.coupled_areas().is_empty() {
                event!(Level::INFO, day = %report.day, "day cleared without coupling");
            }
            sink(report).map_err(SimulationError::Sink)?;
        }
        Ok(())
    }
}

/// A failed multi-day run
#[derive(Debug, thiserror::Error)]
pub enum SimulationError<E> {
    /// The engine failed
    #[error(transparent)]
    Market(MarketError),
    /// The report sink failed
    #[error("unable to record report: {0}")]
    Sink(E),
}

use crate::{AreaAuction, ExecutorError, MarketError, PhaseRunner};
use dam_core::{
    models::{
        Area, AreaClearingResult, AreaId, CapacityMatrix, Day, FlowError, FlowMatrix,
        ForecastSnapshot, HOURS_PER_DAY, Map, MarketConfig,
    },
    ports::{
        AllocationOutcome, AllocationRequest, Allocator, BidSource, CallMarket, CapacityProvider,
        DemandAndRenewableSource,
    },
};
use dam_forecast::{ExchangeFlowForecaster, StorageDispatchForecaster};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument as _, Level, event, span};

/// A failure of the coupled allocation. Any of these abandons coupling for
/// the whole day and every coupled area clears on its own.
#[derive(Debug, Error)]
pub enum CouplingError {
    /// The allocation capability failed
    #[error("allocation failed for hour {hour}: {source}")]
    Allocation {
        /// The failing hour
        hour: usize,
        /// The allocator's error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The allocated flows are inconsistent
    #[error("inconsistent flows in hour {hour}: {source}")]
    Flow {
        /// The failing hour
        hour: usize,
        /// What was wrong
        source: FlowError,
    },
    /// The allocation did not cover the request
    #[error("allocation for hour {hour} does not match the bids of area {area}")]
    Malformed {
        /// The failing hour
        hour: usize,
        /// The area whose ratios are missing or misshapen
        area: AreaId,
    },
    /// An allocation task did not complete
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// The steps of a simulated day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    /// No day has started
    #[default]
    Init,
    /// Re-estimating exchange and storage forecasts
    Forecast,
    /// Gathering and validating bids in every area
    PreClear,
    /// Allocating each hour across the coupled areas
    Allocate,
    /// Clearing the coupled areas on their own after a coupling failure
    Fallback,
    /// Committing the day and running post-clearing hooks
    Settle,
}

/// Everything the optimizer reads from or delegates to.
pub struct Capabilities<A, C> {
    /// The cross-area allocation primitive
    pub allocator: A,
    /// The per-area clearing primitive
    pub market: C,
    /// Interconnection capacities
    pub capacities: Arc<dyn CapacityProvider>,
    /// Residual load and available capacity
    pub outlook: Arc<dyn DemandAndRenewableSource>,
}

/// The published outcome of one simulated day.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DayReport {
    /// The delivery day
    pub day: Day,
    /// Whether the coupled areas were cleared jointly
    pub coupled: bool,
    /// Why coupling was abandoned, if it was
    pub fallback: Option<String>,
    /// One result per area, in area order
    pub results: Vec<AreaClearingResult>,
    /// The committed flows between coupled areas
    pub flows: FlowMatrix,
}

/// Orchestrates the areas through each simulated day.
///
/// Forecasts are refreshed, every area gathers its bids, the coupled areas
/// are allocated hour by hour under the interconnection capacities, and the
/// uncoupled areas clear on their own. If coupling fails for any reason the
/// day's allocation is discarded entirely and the coupled areas clear on
/// their own as well.
pub struct CouplingOptimizer<A, C> {
    config: MarketConfig,
    runner: PhaseRunner,
    allocator: Arc<A>,
    market: Arc<C>,
    capacities: Arc<dyn CapacityProvider>,
    outlook: Arc<dyn DemandAndRenewableSource>,
    auctions: Map<AreaId, AreaAuction>,
    coupled: Vec<AreaId>,
    exchange: ExchangeFlowForecaster,
    storage: StorageDispatchForecaster,
    snapshot: Arc<ForecastSnapshot>,
    flows: FlowMatrix,
    realized_flows: Option<FlowMatrix>,
    realized_storage: Option<Map<AreaId, Vec<f64>>>,
    phase: Phase,
}

impl<A, C> CouplingOptimizer<A, C>
where
    A: Allocator + 'static,
    C: CallMarket + 'static,
{
    /// Set up the auctions and forecasters for `areas`, starting at `start`
    pub fn new(
        config: MarketConfig,
        runner: PhaseRunner,
        capabilities: Capabilities<A, C>,
        areas: Vec<Area>,
        start: Day,
    ) -> Result<Self, MarketError> {
        let Capabilities {
            allocator,
            market,
            capacities,
            outlook,
        } = capabilities;

        let mut auctions = Map::default();
        for area in areas.iter() {
            let auction = AreaAuction::new(area.clone(), config.price_bounds, config.seed);
            if auctions.insert(area.id.clone(), auction).is_some() {
                return Err(MarketError::DuplicateArea(area.id.clone()));
            }
        }

        let coupled = areas
            .iter()
            .filter(|area| area.coupled)
            .map(|area| area.id.clone())
            .collect::<Vec<_>>();

        let exchange = ExchangeFlowForecaster::new(
            coupled.clone(),
            capacities.as_ref(),
            start,
            config.forecast_horizon_days,
        );
        let storage = StorageDispatchForecaster::new(
            &areas,
            capacities.as_ref(),
            start,
            config.forecast_horizon_days,
        );

        Ok(Self {
            config,
            runner,
            allocator: Arc::new(allocator),
            market: Arc::new(market),
            capacities,
            outlook,
            auctions,
            flows: FlowMatrix::new(coupled.clone()),
            coupled,
            exchange,
            storage,
            snapshot: Arc::default(),
            realized_flows: None,
            realized_storage: None,
            phase: Phase::Init,
        })
    }

    /// Register a participant with an area's auction
    pub fn add_participant(
        &mut self,
        area: &AreaId,
        participant: Arc<dyn BidSource>,
    ) -> Result<(), MarketError> {
        let auction = self
            .auctions
            .get_mut(area)
            .ok_or_else(|| MarketError::UnknownArea(area.clone()))?;
        auction.add_participant(participant);
        Ok(())
    }

    /// The current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The auctions, in area order
    pub fn auctions(&self) -> impl Iterator<Item = &AreaAuction> {
        self.auctions.values()
    }

    /// One area's auction
    pub fn auction(&self, area: &AreaId) -> Option<&AreaAuction> {
        self.auctions.get(area)
    }

    /// The coupled areas, in area order
    pub fn coupled_areas(&self) -> &[AreaId] {
        &self.coupled
    }

    /// The flows committed for the current day
    pub fn flows(&self) -> &FlowMatrix {
        &self.flows
    }

    /// The forecasts handed to bidders for the current day
    pub fn forecasts(&self) -> &Arc<ForecastSnapshot> {
        &self.snapshot
    }

    /// Simulate one day end to end.
    ///
    /// Only a failing call market aborts the day; coupling failures are
    /// absorbed by clearing the coupled areas on their own.
    pub async fn run_day(&mut self, day: Day) -> Result<DayReport, MarketError> {
        let span = span!(Level::INFO, "day", %day);
        async move {
            self.flows.reset();

            self.update_forecasts(day).await?;

            self.phase = Phase::PreClear;
            self.pre_clear(day).await?;

            let mut local = self
                .auctions
                .values()
                .filter(|auction| !auction.area().coupled)
                .map(|auction| auction.area().id.clone())
                .collect::<Vec<_>>();

            let fallback = if self.coupled.is_empty() {
                None
            } else {
                self.phase = Phase::Allocate;
                match self.allocate(day).await {
                    Ok(()) => None,
                    Err(err) => {
                        event!(Level::WARN, %err, "coupling abandoned, clearing areas independently");
                        self.phase = Phase::Fallback;
                        self.reset_accepted_bids_and_flows();
                        local.extend(self.coupled.iter().cloned());
                        Some(err.to_string())
                    }
                }
            };

            self.clear_locally(local).await?;

            self.phase = Phase::Settle;
            self.settle().await?;

            let report = DayReport {
                day,
                coupled: !self.coupled.is_empty() && fallback.is_none(),
                fallback,
                results: self
                    .auctions
                    .values()
                    .filter_map(|auction| auction.result().cloned())
                    .collect(),
                flows: self.flows.clone(),
            };
            event!(Level::INFO, coupled = report.coupled, "day settled");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    // Every participant of every area bids within the same phase
    async fn pre_clear(&mut self, day: Day) -> Result<(), MarketError> {
        let snapshot = &self.snapshot;
        let tasks = self
            .auctions
            .values_mut()
            .enumerate()
            .flat_map(|(area, auction)| {
                auction
                    .open(day, snapshot.clone())
                    .into_iter()
                    .map(move |(owner, task)| ((area, owner), task.submit()))
            })
            .collect();

        let mut gathered = self
            .auctions
            .values()
            .map(|_| Vec::new())
            .collect::<Vec<_>>();
        for ((area, owner), submission) in self.runner.run(tasks).await? {
            gathered[area].push((owner, submission));
        }
        for (auction, submissions) in self.auctions.values_mut().zip(gathered) {
            auction.ingest(day, submissions);
        }
        Ok(())
    }

    async fn update_forecasts(&mut self, day: Day) -> Result<(), MarketError> {
        self.phase = Phase::Forecast;

        let jobs = self.exchange.prepare(
            day,
            self.realized_flows.as_ref(),
            self.outlook.as_ref(),
            self.capacities.as_ref(),
        );
        let tasks = jobs
            .into_iter()
            .map(|job| (job.key.clone(), async move { job.run() }))
            .collect();
        let outputs = self.runner.run(tasks).await?;
        self.exchange
            .complete(outputs.into_iter().map(|(_, output)| output));

        let jobs = self.storage.prepare(
            day,
            self.realized_storage.as_ref(),
            self.outlook.as_ref(),
        );
        let tasks = jobs
            .into_iter()
            .map(|job| (job.key.clone(), async move { job.run() }))
            .collect();
        let outputs = self.runner.run(tasks).await?;
        self.storage
            .complete(outputs.into_iter().map(|(_, output)| output));

        self.snapshot = Arc::new(ForecastSnapshot {
            exchange: self.exchange.forecasts().clone(),
            storage: self.storage.forecasts().clone(),
        });
        Ok(())
    }

    fn capacity_matrix(&self, day: Day, hour: usize) -> CapacityMatrix {
        let stamp = day.hour(hour);
        let mut matrix = CapacityMatrix::default();
        for from in self.coupled.iter() {
            for to in self.coupled.iter().filter(|to| *to != from) {
                let capacity = self.capacities.interconnection_capacity(
                    from,
                    to,
                    stamp.year,
                    stamp.hour_of_year,
                );
                matrix.insert(from.clone(), to.clone(), capacity);
            }
        }
        matrix
    }

    async fn allocate(&mut self, day: Day) -> Result<(), CouplingError> {
        let mut tasks = Vec::with_capacity(HOURS_PER_DAY);
        let mut capacities = Vec::with_capacity(HOURS_PER_DAY);
        for hour in 0..HOURS_PER_DAY {
            let matrix = self.capacity_matrix(day, hour);
            let bids = self
                .coupled
                .iter()
                .filter_map(|id| {
                    let curve = self.auctions.get(id)?.curve(hour).to_vec();
                    Some((id.clone(), curve))
                })
                .collect();
            let request = AllocationRequest {
                day,
                hour,
                bounds: self.config.price_bounds,
                bids,
                capacities: matrix.clone(),
            };
            let allocator = self.allocator.clone();
            tasks.push((hour, async move { allocator.solve(request).await }));
            capacities.push(matrix);
        }

        // every hour must succeed before anything is committed
        let outcomes = self
            .runner
            .run(tasks)
            .await?
            .into_iter()
            .map(|(hour, result)| {
                result.map_err(|err| CouplingError::Allocation {
                    hour,
                    source: Box::new(err),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut prices = self
            .coupled
            .iter()
            .map(|id| (id.clone(), vec![f64::NAN; HOURS_PER_DAY]))
            .collect::<Map<_, _>>();

        for (hour, (outcome, matrix)) in outcomes.into_iter().zip(capacities).enumerate() {
            self.commit_hour(day, hour, &outcome, &matrix)?;
            for (id, hourly) in prices.iter_mut() {
                if let Some(&price) = outcome.prices.get(id) {
                    hourly[hour] = price;
                }
            }
        }

        for (id, hourly) in prices {
            if let Some(auction) = self.auctions.get_mut(&id) {
                let volumes = (0..HOURS_PER_DAY)
                    .map(|h| auction.accepted_demand(h))
                    .collect::<Vec<_>>();
                let startup = (0..HOURS_PER_DAY)
                    .map(|h| auction.marginal_startup_cost(h))
                    .collect::<Vec<_>>();
                auction.publish_results(&hourly, &volumes, &startup, true);
            }
        }
        Ok(())
    }

    fn commit_hour(
        &mut self,
        day: Day,
        hour: usize,
        outcome: &AllocationOutcome,
        capacities: &CapacityMatrix,
    ) -> Result<(), CouplingError> {
        self.flows
            .set_hour(hour, &outcome.flows, capacities)
            .map_err(|source| CouplingError::Flow { hour, source })?;

        for id in self.coupled.iter() {
            let malformed = || CouplingError::Malformed {
                hour,
                area: id.clone(),
            };
            let auction = self.auctions.get_mut(id).ok_or_else(malformed)?;
            let ratios = outcome.ratios.get(id).ok_or_else(malformed)?;
            if ratios.len() != auction.curve(hour).len() {
                return Err(malformed());
            }

            let (sold, bought) = auction.set_accepted_ratios(hour, ratios);
            let export = self.flows.net_export(id, hour);
            let imbalance = sold - bought - export;
            if imbalance.abs() > self.config.balance_tolerance {
                event!(
                    Level::WARN,
                    area = %id,
                    %day,
                    hour,
                    sold,
                    bought,
                    export,
                    "area balance violated"
                );
            }
        }
        Ok(())
    }

    /// Zero every coupled area's accepted volumes and every flow of the day
    fn reset_accepted_bids_and_flows(&mut self) {
        for id in self.coupled.iter() {
            if let Some(auction) = self.auctions.get_mut(id) {
                auction.reset_accepted();
            }
        }
        self.flows.reset();
    }

    async fn clear_locally(&mut self, areas: Vec<AreaId>) -> Result<(), MarketError> {
        let tasks = areas
            .into_iter()
            .filter_map(|id| {
                let request = self.auctions.get(&id)?.call_market_request();
                let market = self.market.clone();
                Some((id, async move { market.clear(request).await }))
            })
            .collect::<Vec<_>>();

        for (id, result) in self.runner.run(tasks).await? {
            let outcome = result.map_err(|err| MarketError::CallMarket {
                area: id.clone(),
                source: Box::new(err),
            })?;
            if let Some(auction) = self.auctions.get_mut(&id) {
                auction.apply_local_outcome(&outcome);
            }
        }
        Ok(())
    }

    async fn settle(&mut self) -> Result<(), MarketError> {
        self.realized_flows = Some(self.flows.clone());
        self.realized_storage = Some(
            self.auctions
                .iter()
                .map(|(id, auction)| {
                    let dispatch = (0..HOURS_PER_DAY)
                        .map(|h| auction.storage_dispatch(h))
                        .collect();
                    (id.clone(), dispatch)
                })
                .collect(),
        );

        let tasks = self
            .auctions
            .iter()
            .filter_map(|(id, auction)| Some((id.clone(), auction.settle_task()?)))
            .collect::<Vec<_>>();
        self.runner.run(tasks).await?;
        Ok(())
    }
}

use crate::{MarketError, PhaseRunner};
use dam_core::{
    models::{
        Area, AreaClearingResult, AreaId, BlockBid, ClearingStatus, Day, Direction,
        ForecastSnapshot, HOURS_PER_DAY, PriceBounds, SimpleBid, price_setting_sell,
    },
    ports::{BidContext, BidSource, CallMarket, CallMarketOutcome, CallMarketRequest},
};
use rand::{SeedableRng as _, rngs::StdRng, seq::SliceRandom as _};
use rustc_hash::FxHasher;
use std::{
    hash::{Hash as _, Hasher as _},
    sync::Arc,
};
use tracing::{Level, event};

/// Computed prices further outside the bounds than this are reported
pub const PRICE_TOLERANCE: f64 = 1e-3;

/// The simple and block bids one participant submits for a day
pub(crate) type Submission = (Vec<SimpleBid>, Vec<BlockBid>);

/// One participant's bidding for a day, detached from its auction so it can
/// run on any worker.
pub(crate) struct BidTask {
    participant: Arc<dyn BidSource>,
    ctx: BidContext,
}

impl BidTask {
    pub(crate) async fn submit(self) -> Submission {
        (
            self.participant.simple_bids(&self.ctx),
            self.participant.block_bids(&self.ctx),
        )
    }
}

/// Where an auction is in its daily cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AuctionState {
    /// Nothing gathered yet
    #[default]
    Initial,
    /// Bids are gathered and validated
    BidsCollected,
    /// Results are written
    Cleared,
}

/// The day-ahead auction of one market area.
///
/// Bids are gathered from the area's participants, validated, shuffled into a
/// reproducible submission sequence and bucketed by hour in clearing order.
/// The auction is then either cleared locally through a [`CallMarket`], or
/// receives externally computed results through
/// [`publish_results`](Self::publish_results).
pub struct AreaAuction {
    area: Area,
    bounds: PriceBounds,
    seed: u64,
    participants: Vec<Arc<dyn BidSource>>,
    state: AuctionState,
    day: Option<Day>,
    // per hour, the valid simple bids in clearing order and their participant
    simple: Vec<Vec<SimpleBid>>,
    owners: Vec<Vec<usize>>,
    blocks: Vec<BlockBid>,
    block_owners: Vec<usize>,
    result: Option<AreaClearingResult>,
}

impl std::fmt::Debug for AreaAuction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AreaAuction")
            .field("area", &self.area)
            .field("participants", &self.participants.len())
            .field("state", &self.state)
            .field("day", &self.day)
            .finish()
    }
}

fn shuffle_seed(seed: u64, day: Day, area: &AreaId) -> u64 {
    let mut hasher = FxHasher::default();
    seed.hash(&mut hasher);
    day.hash(&mut hasher);
    area.hash(&mut hasher);
    hasher.finish()
}

impl AreaAuction {
    /// An auction without participants
    pub fn new(area: Area, bounds: PriceBounds, seed: u64) -> Self {
        Self {
            area,
            bounds,
            seed,
            participants: Vec::new(),
            state: AuctionState::Initial,
            day: None,
            simple: vec![Vec::new(); HOURS_PER_DAY],
            owners: vec![Vec::new(); HOURS_PER_DAY],
            blocks: Vec::new(),
            block_owners: Vec::new(),
            result: None,
        }
    }

    /// Register a participant. Participants are consulted in registration
    /// order.
    pub fn add_participant(&mut self, participant: Arc<dyn BidSource>) {
        self.participants.push(participant);
    }

    /// The area being auctioned
    pub fn area(&self) -> &Area {
        &self.area
    }

    /// The current state
    pub fn state(&self) -> AuctionState {
        self.state
    }

    /// Whether bids have been gathered for the current day
    pub fn has_bids(&self) -> bool {
        self.state != AuctionState::Initial
    }

    /// Whether results are available for the current day
    pub fn is_cleared(&self) -> bool {
        self.state == AuctionState::Cleared
    }

    /// The day currently being auctioned
    pub fn day(&self) -> Option<Day> {
        self.day
    }

    /// The valid simple bids of an hour, sorted in clearing order
    pub fn curve(&self, hour: usize) -> &[SimpleBid] {
        self.simple.get(hour).map(Vec::as_slice).unwrap_or_default()
    }

    /// The valid block bids, in submission order
    pub fn blocks(&self) -> &[BlockBid] {
        &self.blocks
    }

    /// The clearing result, once cleared
    pub fn result(&self) -> Option<&AreaClearingResult> {
        self.result.as_ref()
    }

    /// Gather, shuffle, validate and bucket the day's bids. One task per
    /// participant is run on `runner`.
    pub async fn pre_clear(
        &mut self,
        runner: &PhaseRunner,
        day: Day,
        forecasts: Arc<ForecastSnapshot>,
    ) -> Result<(), MarketError> {
        let tasks = self
            .open(day, forecasts)
            .into_iter()
            .map(|(owner, task)| (owner, task.submit()))
            .collect();
        let gathered = runner.run(tasks).await?;
        self.ingest(day, gathered);
        Ok(())
    }

    /// Reset the auction for `day` and hand out one bidding task per
    /// participant, keyed by participant index.
    pub(crate) fn open(
        &mut self,
        day: Day,
        forecasts: Arc<ForecastSnapshot>,
    ) -> Vec<(usize, BidTask)> {
        self.simple.iter_mut().for_each(Vec::clear);
        self.owners.iter_mut().for_each(Vec::clear);
        self.blocks.clear();
        self.block_owners.clear();
        self.result = None;
        self.day = Some(day);

        let ctx = BidContext {
            day,
            hours: 0..HOURS_PER_DAY,
            forecasts,
        };
        self.participants
            .iter()
            .cloned()
            .enumerate()
            .map(|(owner, participant)| {
                (
                    owner,
                    BidTask {
                        participant,
                        ctx: ctx.clone(),
                    },
                )
            })
            .collect()
    }

    /// Validate, shuffle and bucket the submissions of [`open`](Self::open)'s
    /// tasks, which must arrive in participant order.
    pub(crate) fn ingest(&mut self, day: Day, gathered: Vec<(usize, Submission)>) {
        let mut simple = Vec::new();
        for (owner, (bids, blocks)) in gathered {
            simple.extend(bids.into_iter().map(|bid| (owner, bid)));
            for mut block in blocks {
                block.area = self.area.id.clone();
                match block.validate(&self.bounds) {
                    Ok(()) => {
                        self.blocks.push(block);
                        self.block_owners.push(owner);
                    }
                    Err(err) => event!(
                        Level::WARN,
                        area = %self.area.id,
                        %day,
                        unit = block.unit.0,
                        %err,
                        "dropping block bid"
                    ),
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(shuffle_seed(self.seed, day, &self.area.id));
        simple.shuffle(&mut rng);

        let mut dropped = 0;
        for (sequence, (owner, mut bid)) in simple.into_iter().enumerate() {
            bid.area = self.area.id.clone();
            bid.sequence = sequence as u64;
            bid.accepted_volume = 0.0;
            match bid.validate(&self.bounds) {
                Ok(()) => {
                    let hour = bid.hour;
                    self.simple[hour].push(bid);
                    self.owners[hour].push(owner);
                }
                Err(err) => {
                    dropped += 1;
                    event!(
                        Level::WARN,
                        area = %self.area.id,
                        %day,
                        hour = bid.hour,
                        unit = bid.unit.0,
                        %err,
                        "dropping simple bid"
                    );
                }
            }
        }

        for (bids, owners) in self.simple.iter_mut().zip(self.owners.iter_mut()) {
            let mut paired = bids.drain(..).zip(owners.drain(..)).collect::<Vec<_>>();
            paired.sort_by(|(a, _), (b, _)| a.clearing_order(b));
            for (bid, owner) in paired {
                bids.push(bid);
                owners.push(owner);
            }
        }

        event!(
            Level::DEBUG,
            area = %self.area.id,
            %day,
            simple = self.simple.iter().map(Vec::len).sum::<usize>(),
            blocks = self.blocks.len(),
            dropped,
            "bids collected"
        );
        self.state = AuctionState::BidsCollected;
    }

    /// The request for clearing this area on its own
    pub fn call_market_request(&self) -> CallMarketRequest {
        CallMarketRequest {
            area: self.area.id.clone(),
            day: self.day.unwrap_or(Day::new(0, 0)),
            bounds: self.bounds,
            simple: self.simple.clone(),
            blocks: self.blocks.clone(),
        }
    }

    /// Write back the outcome of clearing this area on its own
    pub fn apply_local_outcome(&mut self, outcome: &CallMarketOutcome) {
        for (hour, bids) in self.simple.iter_mut().enumerate() {
            let accepted = outcome.accepted.get(hour);
            for (idx, bid) in bids.iter_mut().enumerate() {
                bid.accepted_volume = accepted
                    .and_then(|a| a.get(idx))
                    .copied()
                    .unwrap_or_default();
            }
        }
        for (idx, block) in self.blocks.iter_mut().enumerate() {
            block.accepted = outcome.blocks.get(idx).copied().unwrap_or(false);
        }
        self.publish_results(
            &outcome.prices,
            &outcome.volumes,
            &outcome.startup_costs,
            false,
        );
    }

    /// Clear this area on its own through the call market
    pub async fn clear_local<C: CallMarket>(&mut self, market: &C) -> Result<(), MarketError> {
        let outcome = market
            .clear(self.call_market_request())
            .await
            .map_err(|err| MarketError::CallMarket {
                area: self.area.id.clone(),
                source: Box::new(err),
            })?;
        self.apply_local_outcome(&outcome);
        Ok(())
    }

    /// Accept `ratio × volume` of every bid of an hour, in curve order.
    /// Returns the accepted (sell, ask) totals.
    pub fn set_accepted_ratios(&mut self, hour: usize, ratios: &[f64]) -> (f64, f64) {
        let (mut sold, mut bought) = (0.0, 0.0);
        if let Some(bids) = self.simple.get_mut(hour) {
            for (bid, ratio) in bids.iter_mut().zip(ratios) {
                bid.accepted_volume = ratio.clamp(0.0, 1.0) * bid.volume;
                match bid.direction {
                    Direction::Sell => sold += bid.accepted_volume,
                    Direction::Ask => bought += bid.accepted_volume,
                }
            }
        }
        (sold, bought)
    }

    /// Zero every accepted volume and reject every block
    pub fn reset_accepted(&mut self) {
        for bid in self.simple.iter_mut().flatten() {
            bid.accepted_volume = 0.0;
        }
        for block in self.blocks.iter_mut() {
            block.accepted = false;
        }
        self.result = None;
        if self.state == AuctionState::Cleared {
            self.state = AuctionState::BidsCollected;
        }
    }

    /// The accepted demand of an hour, including accepted block asks
    pub fn accepted_demand(&self, hour: usize) -> f64 {
        let simple = self
            .curve(hour)
            .iter()
            .filter(|bid| bid.direction == Direction::Ask)
            .map(|bid| bid.accepted_volume)
            .sum::<f64>();
        let blocks = self
            .blocks
            .iter()
            .filter(|block| block.direction == Direction::Ask)
            .map(|block| block.accepted_volume(hour))
            .sum::<f64>();
        simple + blocks
    }

    /// The start-up cost share of the hour's price-setting sell bid
    pub fn marginal_startup_cost(&self, hour: usize) -> f64 {
        price_setting_sell(self.curve(hour)).map_or(0.0, |bid| bid.startup_cost)
    }

    /// Accepted sell minus accepted ask of storage units in an hour
    pub fn storage_dispatch(&self, hour: usize) -> f64 {
        let simple = self
            .curve(hour)
            .iter()
            .filter(|bid| bid.class.is_storage())
            .map(SimpleBid::signed_accepted)
            .sum::<f64>();
        let blocks = self
            .blocks
            .iter()
            .filter(|block| block.class.is_storage())
            .map(|block| match block.direction {
                Direction::Sell => block.accepted_volume(hour),
                Direction::Ask => -block.accepted_volume(hour),
            })
            .sum::<f64>();
        simple + blocks
    }

    /// Record externally computed hourly results. Prices are clamped into the
    /// price bounds; hours without any bid are marked invalid.
    pub fn publish_results(
        &mut self,
        prices: &[f64],
        volumes: &[f64],
        startup_costs: &[f64],
        coupled: bool,
    ) {
        let day = self.day.unwrap_or(Day::new(0, 0));
        let mut result = AreaClearingResult::new(self.area.id.clone(), day);
        result.coupled = coupled;

        for (hour, outcome) in result.hours.iter_mut().enumerate() {
            let empty = self.curve(hour).is_empty()
                && !self.blocks.iter().any(|b| b.hours().contains(&hour));
            if empty {
                outcome.price = self.bounds.clamp(0.0);
                outcome.status = ClearingStatus::Invalid;
                continue;
            }

            let price = prices.get(hour).copied().unwrap_or(f64::NAN);
            if !price.is_finite() {
                event!(Level::WARN, area = %self.area.id, %day, hour, "no clearing price");
                outcome.price = self.bounds.clamp(0.0);
                outcome.status = ClearingStatus::Invalid;
                continue;
            }

            let clamped = self.bounds.clamp(price);
            if (clamped - price).abs() > PRICE_TOLERANCE {
                event!(
                    Level::WARN,
                    area = %self.area.id,
                    %day,
                    hour,
                    price,
                    clamped,
                    "clearing price outside bounds"
                );
            }
            outcome.price = clamped;
            outcome.volume = volumes.get(hour).copied().unwrap_or_default();
            outcome.startup_cost = startup_costs.get(hour).copied().unwrap_or_default();
            outcome.status = ClearingStatus::Cleared;
        }

        self.result = Some(result);
        self.state = AuctionState::Cleared;
    }

    /// Run every participant's post-clearing hook with its own bids. Returns
    /// a self-contained future suitable for a per-area task.
    pub fn settle_task(&self) -> Option<impl Future<Output = ()> + Send + 'static> {
        let day = self.day?;
        let result = self.result.clone()?;

        let mut accepted = vec![Vec::new(); self.participants.len()];
        for (bids, owners) in self.simple.iter().zip(self.owners.iter()) {
            for (bid, &owner) in bids.iter().zip(owners) {
                accepted[owner].push(bid.clone());
            }
        }
        let work = self
            .participants
            .iter()
            .cloned()
            .zip(accepted)
            .collect::<Vec<_>>();

        Some(async move {
            for (participant, bids) in work {
                participant.settle(day, &result, &bids);
            }
        })
    }
}

//! The participant registry.
//!
//! Each scenario participant names one of a closed set of
//! [`ParticipantKind`]s; the [`Registry`] turns that description into a
//! [`BidSource`] bidding in the participant's area.

use crate::scenario::{Scenario, ScenarioError};
use dam_core::{
    models::{
        AreaClearingResult, AreaId, BlockBid, ClearingStatus, Day, Direction, HOURS_PER_DAY,
        ParticipantClass, SimpleBid, UnitId,
    },
    ports::{BidContext, BidSource},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Storage ignores forecast dispatch smaller than this, in MW
pub const SIGNAL_TOLERANCE: f64 = 1e-3;

/// One bidder of the scenario
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParticipantConfig {
    /// A name for logs
    pub name: String,
    /// The area the participant bids in
    pub area: AreaId,
    /// The unit id used to break ties between equal bids
    pub unit: u64,
    /// What the participant is and how it bids
    #[serde(flatten)]
    pub kind: ParticipantKind,
}

/// An all-or-nothing block offered by a thermal plant
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockConfig {
    /// The first hour of the block
    pub start: usize,
    /// The number of hours
    pub length: usize,
    /// The volume in every hour, taken out of the hourly offers
    pub volume: f64,
    /// The block price; the plant's marginal cost if omitted
    #[serde(default)]
    pub price: Option<f64>,
}

/// The closed set of participant types
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticipantKind {
    /// A dispatchable plant offering its capacity at marginal cost plus a
    /// start-up markup, optionally with a block for its minimum run
    Thermal {
        /// Capacity in MW
        capacity: f64,
        /// Fuel and emission cost per MWh
        marginal_cost: f64,
        /// Start-up cost per MWh, added to every offer
        #[serde(default)]
        startup_cost: f64,
        /// A block bid carved out of the capacity
        #[serde(default)]
        block: Option<BlockConfig>,
    },
    /// Wind or solar output offered at a fixed price
    Renewable {
        /// Installed capacity in MW
        capacity: f64,
        /// The hourly availability profile
        profile: String,
        /// The offer price
        #[serde(default)]
        price: f64,
    },
    /// Consumers following a load profile
    Demand {
        /// Demand in MW at a profile value of 1
        peak: f64,
        /// The hourly demand shape
        profile: String,
        /// The willingness to pay
        value: f64,
    },
    /// A daily cycling battery or pumped-hydro plant
    Storage {
        /// Charge and discharge power in MW
        power: f64,
        /// The price around which it arbitrages until it has seen a day cleared
        reference_price: f64,
        /// The spread between its discharge and charge prices
        spread: f64,
    },
    /// A reservoir with natural inflow, selling at its water value
    SeasonalStorage {
        /// Turbine power in MW
        power: f64,
        /// Reservoir size in MWh
        reservoir: f64,
        /// Inflow in MWh per hour
        inflow: f64,
        /// The opportunity cost of releasing water
        water_value: f64,
    },
    /// An electrolyser buying power up to the value of its hydrogen
    PowerToHydrogen {
        /// Electrical capacity in MW
        capacity: f64,
        /// Hydrogen value per MWh of hydrogen
        hydrogen_price: f64,
        /// MWh of hydrogen per MWh of electricity
        efficiency: f64,
        /// Availability profile; always available if omitted
        #[serde(default)]
        profile: Option<String>,
    },
}

/// Builds bid sources from participant descriptions
#[derive(Debug, Default, Clone, Copy)]
pub struct Registry;

impl Registry {
    /// Create the bid source for a participant
    pub fn create(
        &self,
        config: &ParticipantConfig,
        scenario: &Scenario,
    ) -> Result<Arc<dyn BidSource>, ScenarioError> {
        let identity = Identity {
            name: config.name.clone(),
            area: config.area.clone(),
            unit: UnitId(config.unit),
        };

        let source: Arc<dyn BidSource> = match &config.kind {
            ParticipantKind::Thermal {
                capacity,
                marginal_cost,
                startup_cost,
                block,
            } => Arc::new(Thermal {
                identity,
                capacity: *capacity,
                marginal_cost: *marginal_cost,
                startup_cost: *startup_cost,
                block: block.clone(),
            }),
            ParticipantKind::Renewable {
                capacity,
                profile,
                price,
            } => Arc::new(Profiled {
                identity,
                direction: Direction::Sell,
                class: ParticipantClass::Renewable,
                volumes: scaled(scenario.profile(profile)?, *capacity),
                price: *price,
            }),
            ParticipantKind::Demand {
                peak,
                profile,
                value,
            } => Arc::new(Profiled {
                identity,
                direction: Direction::Ask,
                class: ParticipantClass::Demand,
                volumes: scaled(scenario.profile(profile)?, *peak),
                price: *value,
            }),
            ParticipantKind::Storage {
                power,
                reference_price,
                spread,
            } => Arc::new(Storage {
                identity,
                power: *power,
                reference_price: *reference_price,
                spread: *spread,
                last_prices: Mutex::new(None),
            }),
            ParticipantKind::SeasonalStorage {
                power,
                reservoir,
                inflow,
                water_value,
            } => Arc::new(SeasonalStorage {
                identity,
                power: *power,
                reservoir: *reservoir,
                inflow: *inflow,
                water_value: *water_value,
                level: Mutex::new(*reservoir / 2.0),
            }),
            ParticipantKind::PowerToHydrogen {
                capacity,
                hydrogen_price,
                efficiency,
                profile,
            } => {
                let availability = match profile {
                    Some(name) => scenario.profile(name)?.to_vec(),
                    None => vec![1.0; HOURS_PER_DAY],
                };
                Arc::new(Electrolyser {
                    identity,
                    volumes: scaled(&availability, *capacity),
                    price: hydrogen_price * efficiency,
                })
            }
        };
        Ok(source)
    }
}

fn scaled(profile: &[f64], scale: f64) -> Vec<f64> {
    profile.iter().map(|v| (v * scale).max(0.0)).collect()
}

#[derive(Debug)]
struct Identity {
    name: String,
    area: AreaId,
    unit: UnitId,
}

impl Identity {
    fn bid(
        &self,
        hour: usize,
        price: f64,
        volume: f64,
        direction: Direction,
        class: ParticipantClass,
    ) -> SimpleBid {
        SimpleBid::new(
            self.area.clone(),
            hour,
            price,
            volume,
            direction,
            class,
            self.unit,
        )
    }
}

struct Thermal {
    identity: Identity,
    capacity: f64,
    marginal_cost: f64,
    startup_cost: f64,
    block: Option<BlockConfig>,
}

impl BidSource for Thermal {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid> {
        ctx.hours
            .clone()
            .filter_map(|hour| {
                let reserved = self
                    .block
                    .as_ref()
                    .filter(|block| (block.start..block.start + block.length).contains(&hour))
                    .map_or(0.0, |block| block.volume);
                let volume = self.capacity - reserved;
                (volume > 0.0).then(|| {
                    self.identity
                        .bid(
                            hour,
                            self.marginal_cost + self.startup_cost,
                            volume,
                            Direction::Sell,
                            ParticipantClass::Conventional,
                        )
                        .with_startup_cost(self.startup_cost)
                })
            })
            .collect()
    }

    fn block_bids(&self, _: &BidContext) -> Vec<BlockBid> {
        self.block
            .iter()
            .map(|block| {
                BlockBid::new(
                    self.identity.area.clone(),
                    block.start,
                    block.length,
                    block.price.unwrap_or(self.marginal_cost),
                    block.volume,
                    Direction::Sell,
                    ParticipantClass::Conventional,
                    self.identity.unit,
                )
            })
            .collect()
    }
}

// Renewables and demand: a fixed price and a volume per hour of the day
struct Profiled {
    identity: Identity,
    direction: Direction,
    class: ParticipantClass,
    volumes: Vec<f64>,
    price: f64,
}

impl BidSource for Profiled {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid> {
        ctx.hours
            .clone()
            .filter_map(|hour| {
                let volume = self.volumes.get(hour).copied().unwrap_or_default();
                (volume > 0.0)
                    .then(|| self.identity.bid(hour, self.price, volume, self.direction, self.class))
            })
            .collect()
    }
}

struct Storage {
    identity: Identity,
    power: f64,
    reference_price: f64,
    spread: f64,
    last_prices: Mutex<Option<Vec<f64>>>,
}

impl Storage {
    /// Positive when the hour looks like a discharging hour
    fn signals(&self, ctx: &BidContext) -> (f64, Vec<f64>) {
        let last = self
            .last_prices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let reference = last
            .as_ref()
            .filter(|prices| !prices.is_empty())
            .map_or(self.reference_price, |prices| {
                prices.iter().sum::<f64>() / prices.len() as f64
            });
        let forecast = ctx.forecasts.storage(&self.identity.area);

        let signals = ctx
            .hours
            .clone()
            .map(|hour| {
                let expected = forecast
                    .and_then(|f| f.get(ctx.day.hour(hour)))
                    .filter(|dispatch| dispatch.abs() > SIGNAL_TOLERANCE);
                match (expected, last.as_ref().and_then(|p| p.get(hour))) {
                    (Some(dispatch), _) => dispatch,
                    (None, Some(price)) => price - reference,
                    (None, None) => 0.0,
                }
            })
            .collect();
        (reference, signals)
    }
}

impl BidSource for Storage {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid> {
        let (reference, signals) = self.signals(ctx);
        let half = self.spread / 2.0;
        ctx.hours
            .clone()
            .zip(signals)
            .filter_map(|(hour, signal)| {
                let (price, direction) = if signal > 0.0 {
                    (reference + half, Direction::Sell)
                } else if signal < 0.0 {
                    (reference - half, Direction::Ask)
                } else {
                    return None;
                };
                Some(self.identity.bid(
                    hour,
                    price,
                    self.power,
                    direction,
                    ParticipantClass::ShortTermStorage,
                ))
            })
            .collect()
    }

    fn settle(&self, _: Day, result: &AreaClearingResult, _: &[SimpleBid]) {
        let prices = result
            .hours
            .iter()
            .filter(|hour| hour.status == ClearingStatus::Cleared)
            .map(|hour| hour.price)
            .collect::<Vec<_>>();
        if prices.len() == HOURS_PER_DAY {
            *self
                .last_prices
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(prices);
        }
    }
}

struct SeasonalStorage {
    identity: Identity,
    power: f64,
    reservoir: f64,
    inflow: f64,
    water_value: f64,
    level: Mutex<f64>,
}

impl BidSource for SeasonalStorage {
    fn name(&self) -> &str {
        &self.identity.name
    }

    // An empty reservoir still places zero-volume offers
    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid> {
        let level = *self.level.lock().unwrap_or_else(PoisonError::into_inner);
        let energy = level + self.inflow * HOURS_PER_DAY as f64;
        let volume = (energy / HOURS_PER_DAY as f64).clamp(0.0, self.power);
        ctx.hours
            .clone()
            .map(|hour| {
                self.identity.bid(
                    hour,
                    self.water_value,
                    volume,
                    Direction::Sell,
                    ParticipantClass::SeasonalStorage,
                )
            })
            .collect()
    }

    fn settle(&self, _: Day, _: &AreaClearingResult, bids: &[SimpleBid]) {
        let released = bids.iter().map(|bid| bid.accepted_volume).sum::<f64>();
        let mut level = self.level.lock().unwrap_or_else(PoisonError::into_inner);
        *level = (*level + self.inflow * HOURS_PER_DAY as f64 - released).clamp(0.0, self.reservoir);
    }
}

struct Electrolyser {
    identity: Identity,
    volumes: Vec<f64>,
    price: f64,
}

impl BidSource for Electrolyser {
    fn name(&self) -> &str {
        &self.identity.name
    }

    // Unavailable hours keep a zero-volume placeholder in the book
    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid> {
        ctx.hours
            .clone()
            .map(|hour| {
                let volume = self.volumes.get(hour).copied().unwrap_or_default();
                self.identity.bid(
                    hour,
                    self.price,
                    volume,
                    Direction::Ask,
                    ParticipantClass::PowerToHydrogen,
                )
            })
            .collect()
    }
}

use super::{AreaId, HOURS_PER_DAY};
use std::cmp::Ordering;
use std::ops::Range;
use thiserror::Error;

/// The side of the market a bid is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Direction {
    /// An offer to supply energy
    Sell,
    /// A request to consume energy
    Ask,
}

/// The closed set of participant classes a bid can originate from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ParticipantClass {
    /// Dispatchable thermal generation
    Conventional,
    /// Non-dispatchable renewable generation
    Renewable,
    /// Consumers
    Demand,
    /// Short-term (daily cycling) storage
    ShortTermStorage,
    /// Seasonal storage
    SeasonalStorage,
    /// Electrolysers
    PowerToHydrogen,
}

impl ParticipantClass {
    /// Zero-volume bids are normally dropped during validation. Seasonal
    /// storage and power-to-hydrogen operators keep placeholder bids in the
    /// book, so their zero-volume bids are accepted.
    pub fn allows_zero_volume(self) -> bool {
        matches!(self, Self::SeasonalStorage | Self::PowerToHydrogen)
    }

    /// Whether the class dispatches storage (feeds the storage forecaster)
    pub fn is_storage(self) -> bool {
        matches!(self, Self::ShortTermStorage | Self::SeasonalStorage)
    }
}

/// A stable identifier for the unit (plant, load, storage) behind a bid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct UnitId(pub u64);

/// The admissible price range of an auction.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriceBounds {
    /// The lowest admissible bid and clearing price
    pub min: f64,
    /// The highest admissible bid and clearing price
    pub max: f64,
}

impl PriceBounds {
    /// Whether the price lies inside the bounds (inclusive)
    pub fn contains(&self, price: f64) -> bool {
        self.min <= price && price <= self.max
    }

    /// Clamp a computed price into the bounds. Only ever applied to clearing
    /// prices; bids outside the bounds are rejected instead.
    pub fn clamp(&self, price: f64) -> f64 {
        price.clamp(self.min, self.max)
    }
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: -500.0,
            max: 3000.0,
        }
    }
}

/// The ways in which a bid can be invalid
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Price or volume is NaN or infinite
    #[error("non-finite price or volume")]
    NonFinite,
    /// The price is outside the auction's price bounds
    #[error("price {price} outside [{min}, {max}]")]
    PriceOutOfBounds {
        /// The offending price
        price: f64,
        /// The lower bound
        min: f64,
        /// The upper bound
        max: f64,
    },
    /// The volume is negative
    #[error("negative volume {0}")]
    NegativeVolume(f64),
    /// The volume is zero and the class is not allowed placeholder bids
    #[error("zero volume from {0:?}")]
    ZeroVolume(ParticipantClass),
    /// The hour does not belong to the delivery day
    #[error("hour {0} outside the delivery day")]
    HourOutOfRange(usize),
    /// A block bid spanning no hours
    #[error("block bid spans no hours")]
    EmptyBlock,
}

fn validate_common(
    price: f64,
    volume: f64,
    class: ParticipantClass,
    bounds: &PriceBounds,
) -> Result<(), ValidationError> {
    if !price.is_finite() || !volume.is_finite() {
        return Err(ValidationError::NonFinite);
    }
    if !bounds.contains(price) {
        return Err(ValidationError::PriceOutOfBounds {
            price,
            min: bounds.min,
            max: bounds.max,
        });
    }
    if volume < 0.0 {
        return Err(ValidationError::NegativeVolume(volume));
    }
    if volume == 0.0 && !class.allows_zero_volume() {
        return Err(ValidationError::ZeroVolume(class));
    }
    Ok(())
}

/// A single-hour bid.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimpleBid {
    /// The market area the bid is submitted to
    pub area: AreaId,
    /// The hour of the delivery day (0..24)
    pub hour: usize,
    /// The limit price
    pub price: f64,
    /// The offered or requested volume in MW (non-negative)
    pub volume: f64,
    /// Sell or ask
    pub direction: Direction,
    /// The class of the submitting participant
    pub class: ParticipantClass,
    /// The unit behind the bid
    pub unit: UnitId,
    /// The position in the day's (shuffled) submission sequence
    pub sequence: u64,
    /// The share of the price that covers start-up costs
    pub startup_cost: f64,
    /// The volume accepted by clearing; zero until the day is cleared
    pub accepted_volume: f64,
}

impl SimpleBid {
    /// Construct an unaccepted bid without start-up cost component
    pub fn new(
        area: AreaId,
        hour: usize,
        price: f64,
        volume: f64,
        direction: Direction,
        class: ParticipantClass,
        unit: UnitId,
    ) -> Self {
        Self {
            area,
            hour,
            price,
            volume,
            direction,
            class,
            unit,
            sequence: 0,
            startup_cost: 0.0,
            accepted_volume: 0.0,
        }
    }

    /// Attach a start-up cost component to the bid
    pub fn with_startup_cost(mut self, startup_cost: f64) -> Self {
        self.startup_cost = startup_cost;
        self
    }

    /// Check the bid against the auction's price bounds
    pub fn validate(&self, bounds: &PriceBounds) -> Result<(), ValidationError> {
        if self.hour >= HOURS_PER_DAY {
            return Err(ValidationError::HourOutOfRange(self.hour));
        }
        validate_common(self.price, self.volume, self.class, bounds)
    }

    /// Whether the bid passes validation
    pub fn is_valid(&self, bounds: &PriceBounds) -> bool {
        self.validate(bounds).is_ok()
    }

    /// The canonical clearing order: price ascending, then volume descending,
    /// then unit id, then submission sequence.
    pub fn clearing_order(&self, other: &Self) -> Ordering {
        self.price
            .total_cmp(&other.price)
            .then_with(|| other.volume.total_cmp(&self.volume))
            .then_with(|| self.unit.cmp(&other.unit))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }

    /// The order in which bids of the same direction are accepted. Sells
    /// follow the clearing order; asks are taken from the highest price down
    /// with the same tie-breaks.
    pub fn merit_order(&self, other: &Self) -> Ordering {
        match self.direction {
            Direction::Sell => self.clearing_order(other),
            Direction::Ask => other
                .price
                .total_cmp(&self.price)
                .then_with(|| other.volume.total_cmp(&self.volume))
                .then_with(|| self.unit.cmp(&other.unit))
                .then_with(|| self.sequence.cmp(&other.sequence)),
        }
    }

    /// The accepted share of the bid volume
    pub fn acceptance_ratio(&self) -> f64 {
        if self.volume > 0.0 {
            self.accepted_volume / self.volume
        } else {
            0.0
        }
    }

    /// Accepted volume signed by direction: positive for sells, negative for asks
    pub fn signed_accepted(&self) -> f64 {
        match self.direction {
            Direction::Sell => self.accepted_volume,
            Direction::Ask => -self.accepted_volume,
        }
    }
}

/// The accepted sell bid that comes last in merit order, i.e. the one that
/// sets the price on the supply side.
pub fn price_setting_sell(bids: &[SimpleBid]) -> Option<&SimpleBid> {
    bids.iter()
        .filter(|bid| bid.direction == Direction::Sell && bid.accepted_volume > 0.0)
        .max_by(|a, b| a.merit_order(b))
}

/// A bid valid only if accepted in full across a contiguous range of hours.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockBid {
    /// The market area the bid is submitted to
    pub area: AreaId,
    /// The first hour of the block
    pub start: usize,
    /// The number of consecutive hours in the block
    pub length: usize,
    /// The single limit price of the block
    pub price: f64,
    /// The volume in every hour of the block
    pub volume: f64,
    /// Sell or ask
    pub direction: Direction,
    /// The class of the submitting participant
    pub class: ParticipantClass,
    /// The unit behind the bid
    pub unit: UnitId,
    /// Whether the block was accepted; always all-or-nothing
    pub accepted: bool,
}

impl BlockBid {
    /// Construct an unaccepted block bid
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        area: AreaId,
        start: usize,
        length: usize,
        price: f64,
        volume: f64,
        direction: Direction,
        class: ParticipantClass,
        unit: UnitId,
    ) -> Self {
        Self {
            area,
            start,
            length,
            price,
            volume,
            direction,
            class,
            unit,
            accepted: false,
        }
    }

    /// The hours spanned by the block
    pub fn hours(&self) -> Range<usize> {
        self.start..self.start + self.length
    }

    /// Check the bid against the auction's price bounds
    pub fn validate(&self, bounds: &PriceBounds) -> Result<(), ValidationError> {
        if self.length == 0 {
            return Err(ValidationError::EmptyBlock);
        }
        if self.start + self.length > HOURS_PER_DAY {
            return Err(ValidationError::HourOutOfRange(self.start + self.length - 1));
        }
        validate_common(self.price, self.volume, self.class, bounds)
    }

    /// The accepted volume in the given hour
    pub fn accepted_volume(&self, hour: usize) -> f64 {
        if self.accepted && self.hours().contains(&hour) {
            self.volume
        } else {
            0.0
        }
    }
}

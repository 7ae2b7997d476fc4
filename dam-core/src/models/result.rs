use super::{AreaId, Day, HOURS_PER_DAY};

/// The clearing state of an hourly product
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ClearingStatus {
    /// Not yet cleared
    #[default]
    Initial,
    /// Cleared with a valid price
    Cleared,
    /// Clearing produced no usable price
    Invalid,
}

/// The outcome of one hourly product
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HourOutcome {
    /// The market-clearing price
    pub price: f64,
    /// The traded volume (accepted demand, including exports' counterpart abroad)
    pub volume: f64,
    /// The start-up cost share of the price-setting bid
    pub startup_cost: f64,
    /// The clearing state
    pub status: ClearingStatus,
}

/// The result of one area's day-ahead auction.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AreaClearingResult {
    /// The market area
    pub area: AreaId,
    /// The delivery day
    pub day: Day,
    /// Whether the prices came out of market coupling (as opposed to local clearing)
    pub coupled: bool,
    /// One outcome per hour of the day
    pub hours: Vec<HourOutcome>,
}

impl AreaClearingResult {
    /// An uncleared result for the given area and day
    pub fn new(area: AreaId, day: Day) -> Self {
        Self {
            area,
            day,
            coupled: false,
            hours: vec![HourOutcome::default(); HOURS_PER_DAY],
        }
    }

    /// The clearing prices, hour by hour
    pub fn prices(&self) -> Vec<f64> {
        self.hours.iter().map(|hour| hour.price).collect()
    }

    /// The traded volumes, hour by hour
    pub fn volumes(&self) -> Vec<f64> {
        self.hours.iter().map(|hour| hour.volume).collect()
    }

    /// Whether every hour has been cleared
    pub fn is_cleared(&self) -> bool {
        self.hours
            .iter()
            .all(|hour| hour.status == ClearingStatus::Cleared)
    }
}

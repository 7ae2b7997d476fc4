use super::PriceBounds;

/// Engine-wide settings for the day-ahead market.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MarketConfig {
    /// Admissible bid and clearing prices
    pub price_bounds: PriceBounds,
    /// Size of the worker pool; 1 runs every phase sequentially
    pub cores: usize,
    /// Seed for the daily bid shuffle
    pub seed: u64,
    /// How many days ahead the forecasters project
    pub forecast_horizon_days: usize,
    /// Allowed mismatch in MW between an area's net position and its net export
    pub balance_tolerance: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_bounds: PriceBounds::default(),
            cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            seed: 0,
            forecast_horizon_days: 2,
            balance_tolerance: 1.0,
        }
    }
}

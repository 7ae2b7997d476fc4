use crate::models::{AreaId, BlockBid, Day, PriceBounds, SimpleBid};

/// The input to a single area's local clearing.
#[derive(Clone, Debug)]
pub struct CallMarketRequest {
    /// The area being cleared
    pub area: AreaId,
    /// The delivery day
    pub day: Day,
    /// Admissible prices
    pub bounds: PriceBounds,
    /// The validated simple bids, bucketed by hour (24 buckets)
    pub simple: Vec<Vec<SimpleBid>>,
    /// The validated block bids
    pub blocks: Vec<BlockBid>,
}

/// The result of a single area's local clearing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallMarketOutcome {
    /// Clearing price per hour
    pub prices: Vec<f64>,
    /// Traded volume per hour
    pub volumes: Vec<f64>,
    /// Start-up cost share of the price-setting bid per hour
    pub startup_costs: Vec<f64>,
    /// Accepted volume per simple bid, in the same layout as the request
    pub accepted: Vec<Vec<f64>>,
    /// Acceptance per block bid, in request order
    pub blocks: Vec<bool>,
}

/// The per-area clearing primitive: a welfare-maximizing double auction
/// over the day's hourly and block bids.
///
/// Failures are not expected to be recoverable and are propagated.
pub trait CallMarket: Send + Sync {
    /// Error type for clearing failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// Clear one area's day
    fn clear(
        &self,
        request: CallMarketRequest,
    ) -> impl Future<Output = Result<CallMarketOutcome, Self::Error>> + Send;
}

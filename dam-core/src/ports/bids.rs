use crate::models::{AreaClearingResult, BlockBid, Day, ForecastSnapshot, SimpleBid};
use std::ops::Range;
use std::sync::Arc;

/// What a participant gets to see when asked for its bids.
#[derive(Clone, Debug)]
pub struct BidContext {
    /// The delivery day being auctioned
    pub day: Day,
    /// The hours open for simple bids
    pub hours: Range<usize>,
    /// The exchange and storage forecasts computed for this day
    pub forecasts: Arc<ForecastSnapshot>,
}

/// A market participant submitting bids to one area's auction.
///
/// Bid callbacks for different participants run concurrently, so
/// implementations that keep state across days need interior mutability.
pub trait BidSource: Send + Sync {
    /// A human-readable name used in logs
    fn name(&self) -> &str;

    /// The hourly bids for the day; may be empty
    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid>;

    /// The block bids for the day; may be empty
    fn block_bids(&self, ctx: &BidContext) -> Vec<BlockBid> {
        let _ = ctx;
        Vec::new()
    }

    /// Called once the day has settled, with the area's result and the
    /// participant's own valid simple bids (accepted volumes filled in).
    fn settle(&self, day: Day, result: &AreaClearingResult, bids: &[SimpleBid]) {
        let _ = (day, result, bids);
    }
}

mod allocation;
mod bids;
mod call_market;
mod outlook;

pub use allocation::{AllocationOutcome, AllocationRequest, Allocator};
pub use bids::{BidContext, BidSource};
pub use call_market::{CallMarket, CallMarketOutcome, CallMarketRequest};
pub use outlook::{CapacityProvider, DemandAndRenewableSource};

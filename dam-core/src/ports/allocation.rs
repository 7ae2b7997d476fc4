use crate::models::{AreaId, CapacityMatrix, Day, Map, PriceBounds, SimpleBid};

/// The input to one hour of coupled allocation.
#[derive(Clone, Debug)]
pub struct AllocationRequest {
    /// The delivery day
    pub day: Day,
    /// The hour of the day
    pub hour: usize,
    /// Admissible prices
    pub bounds: PriceBounds,
    /// The sorted bid curve of every coupled area for this hour
    pub bids: Map<AreaId, Vec<SimpleBid>>,
    /// The interconnection capacities for this hour
    pub capacities: CapacityMatrix,
}

/// The result of one hour of coupled allocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationOutcome {
    /// Acceptance ratio in [0, 1] per bid, in the same layout as the request
    pub ratios: Map<AreaId, Vec<f64>>,
    /// Raw directed flows between areas in MW; may run both ways between a pair
    pub flows: Map<(AreaId, AreaId), f64>,
    /// The clearing price of each area
    pub prices: Map<AreaId, f64>,
}

/// The cross-area allocation primitive.
///
/// Implementations may fail (infeasibility, numerical trouble); the engine
/// converts any failure into a day without coupling.
pub trait Allocator: Send + Sync {
    /// Error type for allocation failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// Allocate one hour across the coupled areas
    fn solve(
        &self,
        request: AllocationRequest,
    ) -> impl Future<Output = Result<AllocationOutcome, Self::Error>> + Send;
}

use crate::models::AreaId;

/// Read-only access to interconnection capacities.
pub trait CapacityProvider: Send + Sync {
    /// The capacity in MW from one area to another at an absolute hour
    fn interconnection_capacity(
        &self,
        from: &AreaId,
        to: &AreaId,
        year: u32,
        hour_of_year: u32,
    ) -> f64;
}

/// Read-only access to realized and forecasted demand and renewable output.
pub trait DemandAndRenewableSource: Send + Sync {
    /// Demand minus non-dispatchable generation in MW
    fn residual_load(&self, area: &AreaId, year: u32, hour_of_year: u32) -> f64;

    /// Dispatchable generation capacity available in MW
    fn available_capacity(&self, area: &AreaId, year: u32, hour_of_year: u32) -> f64;
}

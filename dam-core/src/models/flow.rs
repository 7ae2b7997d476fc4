use super::{AreaId, HOURS_PER_DAY, Map};
use thiserror::Error;

/// Netted flows may exceed capacity by this many MW before it counts as a breach
pub const FLOW_TOLERANCE: f64 = 1e-6;

/// The interconnection capacities for a single hour.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapacityMatrix(Map<(AreaId, AreaId), f64>);

impl CapacityMatrix {
    /// Record the capacity from one area to another. Non-positive capacities are not stored.
    pub fn insert(&mut self, from: AreaId, to: AreaId, capacity: f64) {
        if capacity > 0.0 && from != to {
            self.0.insert((from, to), capacity);
        } else {
            self.0.swap_remove(&(from, to));
        }
    }

    /// The capacity from one area to another (zero if not connected)
    pub fn get(&self, from: &AreaId, to: &AreaId) -> f64 {
        self.0
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Iterate over the connected (from, to) pairs and their capacities
    pub fn iter(&self) -> impl Iterator<Item = (&AreaId, &AreaId, f64)> {
        self.0.iter().map(|((from, to), capacity)| (from, to, *capacity))
    }

    /// The number of connected directed pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no pair is connected
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<((AreaId, AreaId), f64)> for CapacityMatrix {
    fn from_iter<T: IntoIterator<Item = ((AreaId, AreaId), f64)>>(iter: T) -> Self {
        let mut matrix = Self::default();
        for ((from, to), capacity) in iter {
            matrix.insert(from, to, capacity);
        }
        matrix
    }
}

/// The ways in which a set of flows can violate physical invariants
#[derive(Debug, Error, PartialEq)]
pub enum FlowError {
    /// A flow from an area to itself
    #[error("nonzero self-flow {flow} MW in {area} at hour {hour}")]
    SelfFlow {
        /// The area
        area: AreaId,
        /// The hour
        hour: usize,
        /// The offending flow
        flow: f64,
    },
    /// A netted flow larger than the interconnection capacity
    #[error("flow {flow} MW from {from} to {to} at hour {hour} exceeds capacity {capacity} MW")]
    CapacityExceeded {
        /// The exporting area
        from: AreaId,
        /// The importing area
        to: AreaId,
        /// The hour
        hour: usize,
        /// The netted flow
        flow: f64,
        /// The capacity in the direction of the flow
        capacity: f64,
    },
    /// An hour outside the day
    #[error("hour {0} is outside the day")]
    HourOutOfRange(usize),
    /// A flow that involves an area outside the matrix
    #[error("flow involves unknown area {0}")]
    UnknownArea(AreaId),
    /// A flow that is NaN or infinite
    #[error("non-finite flow from {from} to {to} at hour {hour}")]
    NonFinite {
        /// The exporting area
        from: AreaId,
        /// The importing area
        to: AreaId,
        /// The hour
        hour: usize,
    },
}

/// The netted inter-area flows of one day, in MW.
///
/// For every hour and every pair of areas at most one direction carries a
/// (non-negative) flow, and no area ever flows to itself.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowMatrix {
    areas: Vec<AreaId>,
    // per hour, a row-major areas × areas matrix
    hours: Vec<Vec<f64>>,
}

impl FlowMatrix {
    /// An all-zero matrix for the given areas
    pub fn new(areas: Vec<AreaId>) -> Self {
        let n = areas.len();
        Self {
            areas,
            hours: vec![vec![0.0; n * n]; HOURS_PER_DAY],
        }
    }

    /// The areas spanned by the matrix
    pub fn areas(&self) -> &[AreaId] {
        &self.areas
    }

    fn index(&self, area: &AreaId) -> Option<usize> {
        self.areas.iter().position(|a| a == area)
    }

    /// The netted flow from one area to another (zero if it runs the other way)
    pub fn flow(&self, from: &AreaId, to: &AreaId, hour: usize) -> f64 {
        match (self.index(from), self.index(to)) {
            (Some(i), Some(j)) => self
                .hours
                .get(hour)
                .map_or(0.0, |matrix| matrix[i * self.areas.len() + j]),
            _ => 0.0,
        }
    }

    /// The signed flow from one area to another: positive for from→to
    pub fn signed_flow(&self, from: &AreaId, to: &AreaId, hour: usize) -> f64 {
        self.flow(from, to, hour) - self.flow(to, from, hour)
    }

    /// Exports minus imports of an area
    pub fn net_export(&self, area: &AreaId, hour: usize) -> f64 {
        let (Some(i), Some(matrix)) = (self.index(area), self.hours.get(hour)) else {
            return 0.0;
        };
        let n = self.areas.len();
        (0..n).map(|j| matrix[i * n + j] - matrix[j * n + i]).sum()
    }

    /// Net the raw directed flows of one hour and store them.
    ///
    /// The raw flows may run in both directions between a pair of areas; they
    /// are collapsed into a single directional value. Nothing is written if
    /// any self-flow is nonzero or any netted flow exceeds its capacity.
    pub fn set_hour(
        &mut self,
        hour: usize,
        raw: &Map<(AreaId, AreaId), f64>,
        capacities: &CapacityMatrix,
    ) -> Result<(), FlowError> {
        if hour >= self.hours.len() {
            return Err(FlowError::HourOutOfRange(hour));
        }
        let n = self.areas.len();
        let mut gross = vec![0.0; n * n];

        for ((from, to), &flow) in raw.iter() {
            if !flow.is_finite() {
                return Err(FlowError::NonFinite {
                    from: from.clone(),
                    to: to.clone(),
                    hour,
                });
            }
            if from == to {
                if flow != 0.0 {
                    return Err(FlowError::SelfFlow {
                        area: from.clone(),
                        hour,
                        flow,
                    });
                }
                continue;
            }
            let i = self
                .index(from)
                .ok_or_else(|| FlowError::UnknownArea(from.clone()))?;
            let j = self
                .index(to)
                .ok_or_else(|| FlowError::UnknownArea(to.clone()))?;
            gross[i * n + j] += flow;
        }

        let mut netted = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let net = gross[i * n + j] - gross[j * n + i];
                let (a, b, value) = if net >= 0.0 { (i, j, net) } else { (j, i, -net) };
                let capacity = capacities.get(&self.areas[a], &self.areas[b]);
                if value > capacity + FLOW_TOLERANCE {
                    return Err(FlowError::CapacityExceeded {
                        from: self.areas[a].clone(),
                        to: self.areas[b].clone(),
                        hour,
                        flow: value,
                        capacity,
                    });
                }
                netted[a * n + b] = value;
            }
        }

        self.hours[hour] = netted;
        Ok(())
    }

    /// Zero every flow of every hour
    pub fn reset(&mut self) {
        for matrix in self.hours.iter_mut() {
            matrix.iter_mut().for_each(|flow| *flow = 0.0);
        }
    }

    /// Whether every flow of every hour is zero
    pub fn is_zero(&self) -> bool {
        self.hours.iter().flatten().all(|flow| *flow == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas() -> Vec<AreaId> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    fn capacities() -> CapacityMatrix {
        [
            (("A".into(), "B".into()), 30.0),
            (("B".into(), "A".into()), 20.0),
            (("B".into(), "C".into()), 10.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn nets_opposing_flows() {
        let mut matrix = FlowMatrix::new(areas());
        let raw: Map<_, _> = [
            (("A".into(), "B".into()), 25.0),
            (("B".into(), "A".into()), 10.0),
        ]
        .into_iter()
        .collect();
        matrix.set_hour(3, &raw, &capacities()).unwrap();

        let (a, b) = (AreaId::from("A"), AreaId::from("B"));
        assert_eq!(matrix.flow(&a, &b, 3), 15.0);
        assert_eq!(matrix.flow(&b, &a, 3), 0.0);
        assert_eq!(matrix.net_export(&a, 3), 15.0);
        assert_eq!(matrix.net_export(&b, 3), -15.0);
        assert_eq!(matrix.signed_flow(&b, &a, 3), -15.0);
    }

    #[test]
    fn rejects_self_flow() {
        let mut matrix = FlowMatrix::new(areas());
        let raw: Map<_, _> = [(("C".into(), "C".into()), 1.0)].into_iter().collect();
        assert!(matches!(
            matrix.set_hour(0, &raw, &capacities()),
            Err(FlowError::SelfFlow { .. })
        ));
        assert!(matrix.is_zero());
    }

    #[test]
    fn rejects_capacity_breach_without_writing() {
        let mut matrix = FlowMatrix::new(areas());
        let raw: Map<_, _> = [
            (("A".into(), "B".into()), 5.0),
            (("B".into(), "C".into()), 10.5),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            matrix.set_hour(0, &raw, &capacities()),
            Err(FlowError::CapacityExceeded { .. })
        ));
        assert!(matrix.is_zero());
    }

    #[test]
    fn tolerates_tiny_breaches_without_snapping() {
        let mut matrix = FlowMatrix::new(areas());
        let raw: Map<_, _> = [
            (("B".into(), "C".into()), 10.0 + 0.5 * FLOW_TOLERANCE),
            (("A".into(), "C".into()), 1e-9),
        ]
        .into_iter()
        .collect();
        let capacities: CapacityMatrix = capacities()
            .iter()
            .map(|(from, to, cap)| ((from.clone(), to.clone()), cap))
            .chain([(("A".into(), "C".into()), 5.0)])
            .collect();
        matrix.set_hour(0, &raw, &capacities).unwrap();

        let (a, b, c) = (AreaId::from("A"), AreaId::from("B"), AreaId::from("C"));
        assert_eq!(matrix.flow(&b, &c, 0), 10.0 + 0.5 * FLOW_TOLERANCE);
        assert_eq!(matrix.flow(&a, &c, 0), 1e-9);
    }

    #[test]
    fn hours_past_the_day_read_as_zero() {
        let mut matrix = FlowMatrix::new(areas());
        let raw: Map<_, _> = [(("A".into(), "B".into()), 12.0)].into_iter().collect();
        matrix.set_hour(23, &raw, &capacities()).unwrap();

        let (a, b) = (AreaId::from("A"), AreaId::from("B"));
        assert_eq!(matrix.flow(&a, &b, 23), 12.0);
        assert_eq!(matrix.flow(&a, &b, 24), 0.0);
        assert_eq!(matrix.signed_flow(&a, &b, 24), 0.0);
        assert_eq!(matrix.net_export(&a, 30), 0.0);
        assert_eq!(
            matrix.set_hour(24, &raw, &capacities()),
            Err(FlowError::HourOutOfRange(24))
        );
    }
}

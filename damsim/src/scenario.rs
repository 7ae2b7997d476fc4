//! The scenario: market areas, the grid between them and the demand and
//! renewable outlook that drives both bidders and forecasters.

use crate::participants::{ParticipantConfig, Registry};
use dam_core::{
    models::{Area, AreaId, CapacityMatrix, HOURS_PER_DAY, Map, MarketType},
    ports::{BidSource, CapacityProvider, DemandAndRenewableSource},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Problems with a scenario that prevent it from being simulated
#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    /// A profile was referenced but never defined
    #[error("unknown profile {0}")]
    UnknownProfile(String),
    /// A profile without one value per hour of the day
    #[error("profile {name} has {len} values, expected {HOURS_PER_DAY}")]
    ProfileLength {
        /// The profile
        name: String,
        /// How many values it has
        len: usize,
    },
    /// A participant or interconnector refers to an undefined area
    #[error("unknown area {0}")]
    UnknownArea(AreaId),
    /// An interconnector from an area to itself
    #[error("interconnector from {0} to itself")]
    SelfLoop(AreaId),
}

/// A market area and the shape of its load
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AreaConfig {
    /// The area identifier
    pub id: AreaId,
    /// The kind of market the area belongs to
    #[serde(default = "power")]
    pub market_type: MarketType,
    /// Whether the area takes part in market coupling
    #[serde(default = "yes")]
    pub coupled: bool,
    /// The hourly demand shape, scaled by `peak_demand`
    #[serde(default)]
    pub demand_profile: Option<String>,
    /// Demand in MW at a profile value of 1
    #[serde(default)]
    pub peak_demand: f64,
    /// The hourly renewable availability, scaled by `renewable_capacity`
    #[serde(default)]
    pub renewable_profile: Option<String>,
    /// Installed renewable capacity in MW
    #[serde(default)]
    pub renewable_capacity: f64,
    /// Dispatchable generation capacity in MW
    #[serde(default)]
    pub dispatchable_capacity: f64,
}

fn power() -> MarketType {
    "power".into()
}

fn yes() -> bool {
    true
}

/// A transmission line. Capacities apply to every hour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Interconnector {
    /// The exporting end
    pub from: AreaId,
    /// The importing end
    pub to: AreaId,
    /// Capacity from `from` to `to` in MW
    pub capacity: f64,
    /// Capacity in the opposite direction; the same as `capacity` if omitted
    #[serde(default)]
    pub reverse_capacity: Option<f64>,
}

/// The full description of a simulated market
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Scenario {
    /// The market areas, in reporting order
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
    /// The lines between areas
    #[serde(default)]
    pub interconnectors: Vec<Interconnector>,
    /// Named 24-hour profiles
    #[serde(default)]
    pub profiles: Map<String, Vec<f64>>,
    /// The bidders
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
}

/// A scenario resolved into engine inputs
pub struct World {
    /// The market areas
    pub areas: Vec<Area>,
    /// Interconnection capacities
    pub capacities: Arc<GridCapacities>,
    /// Residual load and available capacity
    pub outlook: Arc<ProfileOutlook>,
    /// The bidders, with the area they bid in
    pub participants: Vec<(AreaId, Arc<dyn BidSource>)>,
}

impl Scenario {
    /// Look up a profile, checking that it covers a whole day
    pub fn profile(&self, name: &str) -> Result<&[f64], ScenarioError> {
        let values = self
            .profiles
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownProfile(name.to_owned()))?;
        if values.len() == HOURS_PER_DAY {
            Ok(values)
        } else {
            Err(ScenarioError::ProfileLength {
                name: name.to_owned(),
                len: values.len(),
            })
        }
    }

    fn scaled(&self, name: Option<&str>, scale: f64) -> Result<Vec<f64>, ScenarioError> {
        match name {
            Some(name) => Ok(self.profile(name)?.iter().map(|v| v * scale).collect()),
            None => Ok(vec![0.0; HOURS_PER_DAY]),
        }
    }

    fn check_area(&self, id: &AreaId) -> Result<(), ScenarioError> {
        if self.areas.iter().any(|area| &area.id == id) {
            Ok(())
        } else {
            Err(ScenarioError::UnknownArea(id.clone()))
        }
    }

    /// Resolve profiles, lines and participants
    pub fn build(&self, registry: &Registry) -> Result<World, ScenarioError> {
        let areas = self
            .areas
            .iter()
            .map(|config| {
                let area = Area::new(config.id.clone(), config.market_type.clone());
                if config.coupled { area } else { area.isolated() }
            })
            .collect();

        let mut matrix = CapacityMatrix::default();
        for line in self.interconnectors.iter() {
            self.check_area(&line.from)?;
            self.check_area(&line.to)?;
            if line.from == line.to {
                return Err(ScenarioError::SelfLoop(line.from.clone()));
            }
            matrix.insert(line.from.clone(), line.to.clone(), line.capacity);
            matrix.insert(
                line.to.clone(),
                line.from.clone(),
                line.reverse_capacity.unwrap_or(line.capacity),
            );
        }

        let mut outlook = Map::default();
        for config in self.areas.iter() {
            let profile = AreaOutlook {
                demand: self.scaled(config.demand_profile.as_deref(), config.peak_demand)?,
                renewable: self.scaled(
                    config.renewable_profile.as_deref(),
                    config.renewable_capacity,
                )?,
                dispatchable: config.dispatchable_capacity,
            };
            outlook.insert(config.id.clone(), profile);
        }

        let participants = self
            .participants
            .iter()
            .map(|config| {
                self.check_area(&config.area)?;
                Ok((config.area.clone(), registry.create(config, self)?))
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        Ok(World {
            areas,
            capacities: Arc::new(GridCapacities(matrix)),
            outlook: Arc::new(ProfileOutlook(outlook)),
            participants,
        })
    }
}

/// Constant interconnection capacities
#[derive(Debug, Default)]
pub struct GridCapacities(CapacityMatrix);

impl CapacityProvider for GridCapacities {
    fn interconnection_capacity(&self, from: &AreaId, to: &AreaId, _: u32, _: u32) -> f64 {
        self.0.get(from, to)
    }
}

#[derive(Debug)]
struct AreaOutlook {
    demand: Vec<f64>,
    renewable: Vec<f64>,
    dispatchable: f64,
}

/// Repeats each area's daily demand and renewable shape every day
#[derive(Debug, Default)]
pub struct ProfileOutlook(Map<AreaId, AreaOutlook>);

impl DemandAndRenewableSource for ProfileOutlook {
    fn residual_load(&self, area: &AreaId, _: u32, hour_of_year: u32) -> f64 {
        let hour = hour_of_year as usize % HOURS_PER_DAY;
        self.0
            .get(area)
            .map_or(0.0, |outlook| outlook.demand[hour] - outlook.renewable[hour])
    }

    fn available_capacity(&self, area: &AreaId, _: u32, _: u32) -> f64 {
        self.0.get(area).map_or(0.0, |outlook| outlook.dispatchable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participants::ParticipantKind;

    fn area(id: &str) -> AreaConfig {
        AreaConfig {
            id: id.into(),
            market_type: power(),
            coupled: true,
            demand_profile: Some("flat".to_owned()),
            peak_demand: 100.0,
            renewable_profile: None,
            renewable_capacity: 0.0,
            dispatchable_capacity: 80.0,
        }
    }

    fn scenario() -> Scenario {
        let mut profiles = Map::default();
        profiles.insert("flat".to_owned(), vec![0.5; HOURS_PER_DAY]);
        profiles.insert("short".to_owned(), vec![1.0; 3]);
        Scenario {
            areas: vec![area("A"), area("B")],
            interconnectors: vec![Interconnector {
                from: "A".into(),
                to: "B".into(),
                capacity: 30.0,
                reverse_capacity: Some(10.0),
            }],
            profiles,
            participants: Vec::new(),
        }
    }

    #[test]
    fn lines_are_directed() {
        let world = scenario().build(&Registry).unwrap();
        let (a, b) = (AreaId::from("A"), AreaId::from("B"));
        assert_eq!(world.capacities.interconnection_capacity(&a, &b, 2030, 5), 30.0);
        assert_eq!(world.capacities.interconnection_capacity(&b, &a, 2030, 5), 10.0);
        assert_eq!(world.capacities.interconnection_capacity(&a, &a, 2030, 5), 0.0);
    }

    #[test]
    fn outlook_repeats_daily() {
        let world = scenario().build(&Registry).unwrap();
        let a = AreaId::from("A");
        assert_eq!(world.outlook.residual_load(&a, 2030, 3), 50.0);
        assert_eq!(world.outlook.residual_load(&a, 2030, 27), 50.0);
        assert_eq!(world.outlook.available_capacity(&a, 2030, 27), 80.0);
        assert_eq!(world.outlook.residual_load(&"Z".into(), 2030, 27), 0.0);
    }

    #[test]
    fn broken_references_are_reported() {
        let mut broken = scenario();
        broken.areas[1].renewable_profile = Some("short".to_owned());
        assert_eq!(
            broken.build(&Registry).err(),
            Some(ScenarioError::ProfileLength {
                name: "short".to_owned(),
                len: 3
            })
        );

        let mut broken = scenario();
        broken.participants.push(ParticipantConfig {
            name: "ghost".to_owned(),
            area: "C".into(),
            unit: 1,
            kind: ParticipantKind::Thermal {
                capacity: 10.0,
                marginal_cost: 20.0,
                startup_cost: 0.0,
                block: None,
            },
        });
        assert_eq!(
            broken.build(&Registry).err(),
            Some(ScenarioError::UnknownArea("C".into()))
        );

        let mut broken = scenario();
        broken.interconnectors[0].to = "A".into();
        assert_eq!(
            broken.build(&Registry).err(),
            Some(ScenarioError::SelfLoop("A".into()))
        );
    }
}

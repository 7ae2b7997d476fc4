//! Application configuration management.
//!
//! Configuration is merged from built-in defaults, an optional scenario file
//! and environment variables, in increasing order of precedence.

use crate::scenario::Scenario;
use config::{ConfigBuilder, builder::DefaultState};
use dam_core::models::{Day, MarketConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The complete configuration of a simulation run
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// Engine settings: price bounds, cores, seed, forecast horizon
    #[serde(default)]
    pub market: MarketConfig,

    /// Which days to simulate
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Areas, interconnectors, profiles and participants
    #[serde(default)]
    pub scenario: Scenario,
}

/// The simulated period
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The first delivery day
    pub start: Day,
    /// The number of consecutive days
    pub days: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: Day::new(2030, 0),
            days: 7,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. The scenario file, if given
    /// 3. Default values (lowest priority)
    ///
    /// Environment variables are mapped using the pattern
    /// `DAMSIM_<SECTION>__<KEY>` to `<section>.<key>`:
    ///
    /// ```bash
    /// # Run every phase on a single thread
    /// export DAMSIM_MARKET__CORES=1
    ///
    /// # Simulate a month
    /// export DAMSIM_SIMULATION__DAYS=30
    /// ```
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::defaults()?;

        if let Some(path) = path {
            if path.exists() {
                config = config.add_source(config::File::from(path));
            } else {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
        }

        Self::finish(config)
    }

    fn defaults() -> anyhow::Result<ConfigBuilder<DefaultState>> {
        Ok(config::Config::builder().add_source(config::Config::try_from(&Self::default())?))
    }

    fn finish(config: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        // DAMSIM_MARKET__SEED maps to market.seed
        let config = config.add_source(
            config::Environment::with_prefix("DAMSIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let built_config = config.build()?;
        built_config.try_deserialize().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participants::ParticipantKind;
    use config::{File, FileFormat};

    fn parse(source: &str) -> AppConfig {
        let config = AppConfig::defaults()
            .unwrap()
            .add_source(File::from_str(source, FileFormat::Toml));
        AppConfig::finish(config).unwrap()
    }

    #[test]
    fn defaults_survive_an_empty_file() {
        let config = parse("");
        assert_eq!(config.simulation.days, 7);
        assert_eq!(config.simulation.start, Day::new(2030, 0));
        assert_eq!(config.market.price_bounds.max, 3000.0);
        assert!(config.scenario.areas.is_empty());
    }

    #[test]
    fn sample_scenario_parses() {
        let config = parse(include_str!("../scenarios/two-areas.toml"));

        assert_eq!(config.market.seed, 42);
        assert_eq!(config.scenario.areas.len(), 3);
        assert!(!config.scenario.areas[2].coupled);
        assert_eq!(config.scenario.interconnectors.len(), 2);
        assert_eq!(config.scenario.profiles["residential"].len(), 24);

        let kinds = config
            .scenario
            .participants
            .iter()
            .map(|p| std::mem::discriminant(&p.kind))
            .collect::<Vec<_>>();
        assert!(kinds.contains(&std::mem::discriminant(&ParticipantKind::Storage {
            power: 0.0,
            reference_price: 0.0,
            spread: 0.0,
        })));
        assert_eq!(config.scenario.participants.len(), 11);
    }

    #[test]
    fn partial_market_section_keeps_other_defaults() {
        let config = parse(
            r#"
            [market]
            seed = 9

            [market.price_bounds]
            min = 0
            max = 500
            "#,
        );
        assert_eq!(config.market.seed, 9);
        assert_eq!(config.market.price_bounds.min, 0.0);
        assert_eq!(config.market.forecast_horizon_days, 2);
    }
}

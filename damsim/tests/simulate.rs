use dam_core::models::{ClearingStatus, HOURS_PER_DAY};
use dam_market::{DayReport, Executor};
use damsim::{AppConfig, SolverLib};
use rstest::*;
use std::path::Path;

#[fixture]
fn scenario() -> AppConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/two-areas.toml");
    let mut config = AppConfig::load(Some(path.as_path())).unwrap();
    config.simulation.days = 3;
    config
}

fn run(config: &AppConfig, lib: SolverLib, cores: usize) -> Vec<u8> {
    let executor = Executor::new(cores).unwrap();
    let mut output = Vec::new();
    lib.simulate(&executor, config, &mut output).unwrap();
    executor.shutdown();
    output
}

fn reports(output: &[u8]) -> Vec<DayReport> {
    std::str::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[rstest]
#[case::clarabel(SolverLib::Clarabel)]
#[case::osqp(SolverLib::Osqp)]
fn sample_scenario_runs(scenario: AppConfig, #[case] lib: SolverLib) {
    let reports = reports(&run(&scenario, lib, 2));
    assert_eq!(reports.len(), 3);

    let bounds = scenario.market.price_bounds;
    let mut day = scenario.simulation.start;
    for report in reports.iter() {
        assert_eq!(report.day, day);
        day = day.next();
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.flows.areas().len(), 2);
        // the interior-point backend solves every hour of this scenario
        if matches!(lib, SolverLib::Clarabel) {
            assert!(report.coupled, "{:?}", report.fallback);
        }

        for result in report.results.iter() {
            for hour in result.hours.iter() {
                assert_eq!(hour.status, ClearingStatus::Cleared);
                assert!(bounds.contains(hour.price));
            }
        }
        let north = &report.flows.areas()[0];
        let south = &report.flows.areas()[1];
        for hour in 0..HOURS_PER_DAY {
            assert!(report.flows.flow(north, south, hour) <= 30.0 + 1e-6);
            assert!(report.flows.flow(south, north, hour) <= 30.0 + 1e-6);
        }
        assert!(!report.results[2].coupled);
    }
}

#[rstest]
fn core_count_does_not_change_reports(scenario: AppConfig) {
    let sequential = run(&scenario, SolverLib::Clarabel, 1);
    let parallel = run(&scenario, SolverLib::Clarabel, 4);
    assert_eq!(sequential, parallel);
}

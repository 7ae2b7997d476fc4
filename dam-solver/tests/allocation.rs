use approx::assert_abs_diff_eq;
use dam_core::{
    models::{
        AreaId, CapacityMatrix, Day, Direction, Map, ParticipantClass, PriceBounds, SimpleBid,
        UnitId,
    },
    ports::{AllocationRequest, Allocator},
};
use dam_solver::{LpBackend, allocate};
use rstest::*;
use rstest_reuse::{self, *};

use all_solvers::all_solvers;

fn bid(area: &str, direction: Direction, price: f64, volume: f64, unit: u64) -> SimpleBid {
    let class = match direction {
        Direction::Sell => ParticipantClass::Conventional,
        Direction::Ask => ParticipantClass::Demand,
    };
    SimpleBid::new(area.into(), 0, price, volume, direction, class, UnitId(unit))
}

fn request(
    bids: impl IntoIterator<Item = SimpleBid>,
    capacities: impl IntoIterator<Item = (&'static str, &'static str, f64)>,
) -> AllocationRequest {
    let mut by_area = Map::<AreaId, Vec<SimpleBid>>::default();
    for bid in bids {
        by_area.entry(bid.area.clone()).or_default().push(bid);
    }
    AllocationRequest {
        day: Day::new(2030, 0),
        hour: 0,
        bounds: PriceBounds::default(),
        bids: by_area,
        capacities: capacities
            .into_iter()
            .map(|(from, to, cap)| ((AreaId::from(from), AreaId::from(to)), cap))
            .collect::<CapacityMatrix>(),
    }
}

fn flow(outcome: &dam_core::ports::AllocationOutcome, from: &str, to: &str) -> f64 {
    outcome
        .flows
        .get(&(AreaId::from(from), AreaId::from(to)))
        .copied()
        .unwrap_or_default()
}

// A: cheap surplus, B: expensive deficit; the line binds at 30 MW and the
// prices split at the marginal sell bids of each side.
#[fixture]
fn import_export() -> AllocationRequest {
    request(
        [
            bid("A", Direction::Sell, 10.0, 100.0, 1),
            bid("A", Direction::Ask, 50.0, 50.0, 2),
            bid("B", Direction::Sell, 40.0, 100.0, 3),
            bid("B", Direction::Ask, 60.0, 100.0, 4),
        ],
        [("A", "B", 30.0), ("B", "A", 30.0)],
    )
}

#[apply(all_solvers)]
#[rstest]
fn binding_line_splits_prices(solver: impl LpBackend, import_export: AllocationRequest) {
    let outcome = allocate(&solver, &import_export).unwrap();

    assert_abs_diff_eq!(flow(&outcome, "A", "B"), 30.0, epsilon = 1e-4);
    assert_abs_diff_eq!(flow(&outcome, "B", "A"), 0.0, epsilon = 1e-4);

    assert_abs_diff_eq!(outcome.prices[&AreaId::from("A")], 10.0, epsilon = 1e-3);
    assert_abs_diff_eq!(outcome.prices[&AreaId::from("B")], 40.0, epsilon = 1e-3);

    let a = &outcome.ratios[&AreaId::from("A")];
    assert_abs_diff_eq!(a[0], 0.8, epsilon = 1e-5);
    assert_abs_diff_eq!(a[1], 1.0, epsilon = 1e-5);
    let b = &outcome.ratios[&AreaId::from("B")];
    assert_abs_diff_eq!(b[0], 0.7, epsilon = 1e-5);
    assert_abs_diff_eq!(b[1], 1.0, epsilon = 1e-5);
}

#[apply(all_solvers)]
#[rstest]
fn mirrored_areas_respect_capacity(solver: impl LpBackend) {
    let req = request(
        [
            bid("A", Direction::Sell, 10.0, 100.0, 1),
            bid("A", Direction::Ask, 50.0, 100.0, 2),
            bid("B", Direction::Sell, 10.0, 100.0, 3),
            bid("B", Direction::Ask, 50.0, 100.0, 4),
        ],
        [("A", "B", 30.0)],
    );
    let outcome = allocate(&solver, &req).unwrap();

    let ab = flow(&outcome, "A", "B");
    assert!(ab <= 30.0 + 1e-6);
    assert!(ab >= 0.0);

    for (area, ratios) in outcome.ratios.iter() {
        let bids = &req.bids[area];
        let net = bids
            .iter()
            .zip(ratios)
            .map(|(bid, r)| match bid.direction {
                Direction::Sell => r * bid.volume,
                Direction::Ask => -r * bid.volume,
            })
            .sum::<f64>();
        let export = if area.as_str() == "A" { ab } else { -ab };
        assert_abs_diff_eq!(net, export, epsilon = 1.0);
    }
}

#[apply(all_solvers)]
#[rstest]
fn equal_bids_fill_by_unit(solver: impl LpBackend) {
    let req = request(
        [
            bid("A", Direction::Sell, 20.0, 10.0, 7),
            bid("A", Direction::Sell, 20.0, 10.0, 3),
            bid("A", Direction::Ask, 50.0, 10.0, 1),
        ],
        [],
    );
    let outcome = allocate(&solver, &req).unwrap();
    let ratios = &outcome.ratios[&AreaId::from("A")];
    assert_eq!(ratios[0], 0.0);
    assert_eq!(ratios[1], 1.0);
    assert_eq!(ratios[2], 1.0);
}

#[apply(all_solvers)]
#[rstest]
fn no_loop_flows(solver: impl LpBackend) {
    let req = request(
        [
            bid("A", Direction::Sell, 10.0, 100.0, 1),
            bid("B", Direction::Sell, 30.0, 100.0, 2),
            bid("C", Direction::Ask, 80.0, 60.0, 3),
        ],
        [
            ("A", "B", 50.0),
            ("B", "A", 50.0),
            ("B", "C", 40.0),
            ("C", "B", 40.0),
            ("A", "C", 25.0),
            ("C", "A", 25.0),
        ],
    );
    let outcome = allocate(&solver, &req).unwrap();

    for (a, b) in [("A", "B"), ("B", "C"), ("A", "C")] {
        let both = flow(&outcome, a, b).min(flow(&outcome, b, a));
        assert_abs_diff_eq!(both, 0.0, epsilon = 1e-4);
    }
    // the cheap area serves all demand, preferring the direct line
    assert_abs_diff_eq!(flow(&outcome, "A", "C"), 25.0, epsilon = 1e-4);
    assert_abs_diff_eq!(flow(&outcome, "A", "B"), 35.0, epsilon = 1e-4);
    assert_abs_diff_eq!(flow(&outcome, "B", "C"), 35.0, epsilon = 1e-4);
    assert_abs_diff_eq!(outcome.prices[&AreaId::from("C")], 10.0, epsilon = 1e-2);
}

#[rstest]
#[tokio::test]
async fn allocator_port(import_export: AllocationRequest) {
    let solver = dam_solver::clarabel::ClarabelSolver::default();
    let outcome = solver.solve(import_export).await.unwrap();
    assert_eq!(outcome.prices.len(), 2);
    assert_eq!(outcome.ratios[&AreaId::from("A")].len(), 2);
}

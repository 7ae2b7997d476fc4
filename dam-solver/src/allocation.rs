use crate::{LinearProgram, LpBackend, SolverError, fill_in_merit_order};
use dam_core::{
    models::{AreaId, Direction, FLOW_TOLERANCE, Map},
    ports::{AllocationOutcome, AllocationRequest},
};
use tracing::{Level, event};

/// The cost per MW of moving energy across an interconnector. Keeps the
/// program from routing loop flows that do not change welfare.
pub const FLOW_COST: f64 = 1e-3;

/// Allocate one hour across coupled areas.
///
/// Every area gets a balance row `Σ sell − Σ ask − exports + imports = 0`,
/// whose shadow price is the area price. Bid variables are bounded by their
/// volume and flow variables by the directed capacity.
pub fn allocate<B: LpBackend + ?Sized>(
    backend: &B,
    request: &AllocationRequest,
) -> Result<AllocationOutcome, SolverError> {
    if request.bids.is_empty() {
        return Ok(AllocationOutcome::default());
    }

    let mut lp = LinearProgram::default();

    let rows = request
        .bids
        .keys()
        .map(|area| (area.clone(), lp.add_row(0.0)))
        .collect::<Map<AreaId, usize>>();

    let mut bid_columns = Map::<AreaId, Vec<usize>>::default();
    for (area, bids) in request.bids.iter() {
        let row = rows[area];
        let columns = bids
            .iter()
            .map(|bid| match bid.direction {
                Direction::Sell => lp.add_column(bid.price, 0.0, bid.volume, [(row, 1.0)]),
                Direction::Ask => lp.add_column(-bid.price, 0.0, bid.volume, [(row, -1.0)]),
            })
            .collect();
        bid_columns.insert(area.clone(), columns);
    }

    let mut flow_columns = Vec::new();
    for (from, to, capacity) in request.capacities.iter() {
        let (Some(&out), Some(&inc)) = (rows.get(from), rows.get(to)) else {
            continue;
        };
        let col = lp.add_column(FLOW_COST, 0.0, capacity, [(out, -1.0), (inc, 1.0)]);
        flow_columns.push((from.clone(), to.clone(), capacity, col));
    }

    let solution = backend.solve_lp(&lp)?;

    let mut ratios = Map::default();
    for (area, bids) in request.bids.iter() {
        let columns = &bid_columns[area];
        let (mut sold, mut bought) = (0.0, 0.0);
        for (bid, &col) in bids.iter().zip(columns) {
            match bid.direction {
                Direction::Sell => sold += solution.x[col],
                Direction::Ask => bought += solution.x[col],
            }
        }

        let sells = fill_in_merit_order(bids, Direction::Sell, sold);
        let asks = fill_in_merit_order(bids, Direction::Ask, bought);
        let area_ratios = bids
            .iter()
            .zip(sells.into_iter().zip(asks))
            .map(|(bid, (s, a))| {
                if bid.volume > 0.0 {
                    ((s + a) / bid.volume).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect();
        ratios.insert(area.clone(), area_ratios);
    }

    let flows = flow_columns
        .into_iter()
        .map(|(from, to, capacity, col)| {
            let flow = solution.x[col].clamp(0.0, capacity);
            let flow = if flow < FLOW_TOLERANCE { 0.0 } else { flow };
            ((from, to), flow)
        })
        .collect();

    let prices = rows
        .into_iter()
        .map(|(area, row)| (area, solution.shadow_prices[row]))
        .collect::<Map<_, _>>();

    event!(
        Level::TRACE,
        day = %request.day,
        hour = request.hour,
        areas = prices.len(),
        "allocated hour"
    );

    Ok(AllocationOutcome {
        ratios,
        flows,
        prices,
    })
}

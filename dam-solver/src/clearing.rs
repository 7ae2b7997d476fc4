use crate::{LinearProgram, LpBackend, LpSolution, SolverError, fill_in_merit_order};
use dam_core::{
    models::{BlockBid, Direction, HOURS_PER_DAY, SimpleBid, price_setting_sell},
    ports::{CallMarketOutcome, CallMarketRequest},
};
use tracing::{Level, event};

/// How far a block's price may sit on the wrong side of the average clearing
/// price over its hours before it counts as paradoxically accepted.
pub const PARADOX_TOLERANCE: f64 = 1e-6;

// Relaxed block acceptance at or above this is rounded to full acceptance
const ROUNDING_THRESHOLD: f64 = 1.0 - 1e-6;

// Slack variables price shed demand and dumped supply just outside the bounds
const SLACK_PENALTY: f64 = 1.0;

enum BlockMode<'a> {
    Relaxed,
    Fixed(&'a [bool]),
}

struct DayProgram {
    lp: LinearProgram,
    simple: Vec<Vec<usize>>,
    blocks: Vec<Option<usize>>,
}

fn block_sign(block: &BlockBid) -> f64 {
    match block.direction {
        Direction::Sell => 1.0,
        Direction::Ask => -1.0,
    }
}

fn build(request: &CallMarketRequest, mode: BlockMode) -> DayProgram {
    let mut lp = LinearProgram::default();
    let rows = (0..HOURS_PER_DAY)
        .map(|_| lp.add_row(0.0))
        .collect::<Vec<_>>();

    let simple = rows
        .iter()
        .enumerate()
        .map(|(hour, &row)| {
            request
                .simple
                .get(hour)
                .map(|bids| {
                    bids.iter()
                        .map(|bid| match bid.direction {
                            Direction::Sell => {
                                lp.add_column(bid.price, 0.0, bid.volume, [(row, 1.0)])
                            }
                            Direction::Ask => {
                                lp.add_column(-bid.price, 0.0, bid.volume, [(row, -1.0)])
                            }
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let blocks = request
        .blocks
        .iter()
        .enumerate()
        .map(|(k, block)| {
            let sign = block_sign(block);
            let hours = block.hours();
            match mode {
                BlockMode::Relaxed => {
                    let cost = sign * block.price * block.volume * hours.len() as f64;
                    let entries = hours.map(|h| (rows[h], sign * block.volume));
                    Some(lp.add_column(cost, 0.0, 1.0, entries))
                }
                BlockMode::Fixed(accepted) => {
                    // accepted blocks become constant injections
                    if accepted[k] {
                        for h in hours {
                            lp.shift_rhs(rows[h], -sign * block.volume);
                        }
                    }
                    None
                }
            }
        })
        .collect();

    // Shed demand and dumped supply keep every fixed configuration feasible
    let bounds = request.bounds;
    for &row in rows.iter() {
        lp.add_column(bounds.max + SLACK_PENALTY, 0.0, f64::INFINITY, [(row, 1.0)]);
        lp.add_column(SLACK_PENALTY - bounds.min, 0.0, f64::INFINITY, [(row, -1.0)]);
    }

    DayProgram { lp, simple, blocks }
}

// The accepted block whose price is furthest on the wrong side of the mean
// price over its hours, if any.
fn worst_paradox(blocks: &[BlockBid], accepted: &[bool], prices: &[f64]) -> Option<usize> {
    let mut worst: Option<(usize, f64)> = None;
    for (k, block) in blocks.iter().enumerate() {
        if !accepted[k] {
            continue;
        }
        let hours = block.hours();
        let mean = hours.clone().map(|h| prices[h]).sum::<f64>() / hours.len() as f64;
        let loss = match block.direction {
            Direction::Sell => block.price - mean,
            Direction::Ask => mean - block.price,
        };
        if loss > PARADOX_TOLERANCE && worst.is_none_or(|(_, w)| loss > w) {
            worst = Some((k, loss));
        }
    }
    worst.map(|(k, _)| k)
}

/// Clear a single area's day.
///
/// Blocks are first solved as a relaxation with fractional acceptance. Only
/// blocks the relaxation accepts in full are kept. Then the program is solved
/// with the kept blocks fixed and the most paradoxically accepted block is
/// rejected, until no accepted block loses money against the hourly prices.
pub fn clear_call_market<B: LpBackend + ?Sized>(
    backend: &B,
    request: &CallMarketRequest,
) -> Result<CallMarketOutcome, SolverError> {
    let mut accepted = if request.blocks.is_empty() {
        Vec::new()
    } else {
        let relaxed = build(request, BlockMode::Relaxed);
        let solution = backend.solve_lp(&relaxed.lp)?;
        relaxed
            .blocks
            .iter()
            .map(|col| col.is_some_and(|col| solution.x[col] >= ROUNDING_THRESHOLD))
            .collect::<Vec<_>>()
    };

    let (program, solution) = loop {
        let program = build(request, BlockMode::Fixed(&accepted));
        let solution = backend.solve_lp(&program.lp)?;

        match worst_paradox(&request.blocks, &accepted, &solution.shadow_prices) {
            Some(k) => {
                event!(
                    Level::DEBUG,
                    area = %request.area,
                    day = %request.day,
                    block = k,
                    "rejecting paradoxically accepted block"
                );
                accepted[k] = false;
            }
            None => break (program, solution),
        }
    };

    Ok(outcome(request, &program, &solution, accepted))
}

fn outcome(
    request: &CallMarketRequest,
    program: &DayProgram,
    solution: &LpSolution,
    blocks: Vec<bool>,
) -> CallMarketOutcome {
    let empty = Vec::new();
    let mut result = CallMarketOutcome {
        prices: Vec::with_capacity(HOURS_PER_DAY),
        volumes: Vec::with_capacity(HOURS_PER_DAY),
        startup_costs: Vec::with_capacity(HOURS_PER_DAY),
        accepted: Vec::with_capacity(HOURS_PER_DAY),
        blocks,
    };

    for (hour, columns) in program.simple.iter().enumerate() {
        let bids = request.simple.get(hour).unwrap_or(&empty);

        let (mut sold, mut bought) = (0.0, 0.0);
        for (bid, &col) in bids.iter().zip(columns) {
            match bid.direction {
                Direction::Sell => sold += solution.x[col],
                Direction::Ask => bought += solution.x[col],
            }
        }
        let accepted = fill_in_merit_order(bids, Direction::Sell, sold)
            .into_iter()
            .zip(fill_in_merit_order(bids, Direction::Ask, bought))
            .map(|(s, a)| s + a)
            .collect::<Vec<_>>();

        let covering = request
            .blocks
            .iter()
            .zip(result.blocks.iter())
            .filter(|(block, _)| block.hours().contains(&hour))
            .collect::<Vec<_>>();

        let price = if bids.is_empty() && covering.is_empty() {
            request.bounds.clamp(0.0)
        } else {
            solution.shadow_prices[hour]
        };

        let block_demand = covering
            .iter()
            .filter(|(block, taken)| **taken && block.direction == Direction::Ask)
            .map(|(block, _)| block.volume)
            .sum::<f64>();
        let volume = bids
            .iter()
            .zip(accepted.iter())
            .filter(|(bid, _)| bid.direction == Direction::Ask)
            .map(|(_, v)| v)
            .sum::<f64>()
            + block_demand;

        let settled = bids
            .iter()
            .zip(accepted.iter())
            .map(|(bid, &v)| SimpleBid {
                accepted_volume: v,
                ..bid.clone()
            })
            .collect::<Vec<_>>();
        let startup_cost = price_setting_sell(&settled).map_or(0.0, |bid| bid.startup_cost);

        result.prices.push(price);
        result.volumes.push(volume);
        result.startup_costs.push(startup_cost);
        result.accepted.push(accepted);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_core::models::{AreaId, ParticipantClass, UnitId};

    fn block(start: usize, length: usize, price: f64, direction: Direction) -> BlockBid {
        BlockBid::new(
            AreaId::from("A"),
            start,
            length,
            price,
            10.0,
            direction,
            ParticipantClass::Conventional,
            UnitId(1),
        )
    }

    #[test]
    fn paradox_picks_largest_loss() {
        let mut prices = vec![20.0; HOURS_PER_DAY];
        prices[1] = 40.0;
        let blocks = vec![
            block(0, 2, 25.0, Direction::Sell),
            block(0, 1, 35.0, Direction::Sell),
            block(0, 2, 50.0, Direction::Sell),
            block(0, 2, 45.0, Direction::Ask),
        ];

        assert_eq!(worst_paradox(&blocks, &[true; 4], &prices), Some(2));
        assert_eq!(worst_paradox(&blocks, &[true, true, false, true], &prices), Some(1));
        assert_eq!(worst_paradox(&blocks, &[true, false, false, true], &prices), None);
    }
}

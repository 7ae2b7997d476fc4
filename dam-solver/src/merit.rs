use dam_core::models::{Direction, SimpleBid};

// Below this, accepted volume is treated as solver noise
const VOLUME_TOLERANCE: f64 = 1e-6;

/// Distribute `total` MW over the bids of one direction in strict merit
/// order, returning the accepted volume of every bid in the input layout.
/// Bids of the other direction receive zero.
pub fn fill_in_merit_order(bids: &[SimpleBid], direction: Direction, total: f64) -> Vec<f64> {
    let mut accepted = vec![0.0; bids.len()];

    let mut order = bids
        .iter()
        .enumerate()
        .filter(|(_, bid)| bid.direction == direction)
        .collect::<Vec<_>>();
    order.sort_by(|(_, a), (_, b)| a.merit_order(b));

    let mut remaining = total.max(0.0);
    for (idx, bid) in order {
        if remaining < VOLUME_TOLERANCE {
            break;
        }
        let take = if bid.volume - remaining < VOLUME_TOLERANCE {
            bid.volume
        } else {
            remaining
        };
        accepted[idx] = take;
        remaining -= take;
    }

    accepted
}

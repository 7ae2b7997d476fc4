use approx::assert_abs_diff_eq;
use dam_core::{
    models::{
        Area, BlockBid, ClearingStatus, Day, Direction, ForecastSnapshot, HOURS_PER_DAY,
        ParticipantClass, PriceBounds, SimpleBid, UnitId,
    },
    ports::{BidContext, BidSource},
};
use dam_market::{AreaAuction, AuctionState, PhaseRunner};
use dam_solver::clarabel::ClarabelSolver;
use std::sync::Arc;

// A crowd of identical offers, so only the shuffle decides their order
struct Crowd {
    units: u64,
}

impl BidSource for Crowd {
    fn name(&self) -> &str {
        "crowd"
    }

    fn simple_bids(&self, ctx: &BidContext) -> Vec<SimpleBid> {
        ctx.hours
            .clone()
            .flat_map(|hour| {
                (0..self.units).map(move |_| {
                    SimpleBid::new(
                        "X".into(),
                        hour,
                        25.0,
                        10.0,
                        Direction::Sell,
                        ParticipantClass::Conventional,
                        UnitId(1),
                    )
                })
            })
            .collect()
    }
}

struct Sloppy;

impl BidSource for Sloppy {
    fn name(&self) -> &str {
        "sloppy"
    }

    fn simple_bids(&self, _: &BidContext) -> Vec<SimpleBid> {
        let bid = |price, volume, class| {
            SimpleBid::new(
                "ignored".into(),
                3,
                price,
                volume,
                Direction::Sell,
                class,
                UnitId(9),
            )
        };
        vec![
            bid(50.0, 10.0, ParticipantClass::Conventional),
            bid(5000.0, 10.0, ParticipantClass::Conventional),
            bid(f64::NAN, 10.0, ParticipantClass::Conventional),
            bid(50.0, -1.0, ParticipantClass::Conventional),
            bid(50.0, 0.0, ParticipantClass::Renewable),
            bid(50.0, 0.0, ParticipantClass::SeasonalStorage),
            bid(60.0, 0.0, ParticipantClass::PowerToHydrogen),
        ]
    }

    fn block_bids(&self, _: &BidContext) -> Vec<BlockBid> {
        vec![
            BlockBid::new(
                "ignored".into(),
                22,
                4,
                30.0,
                5.0,
                Direction::Sell,
                ParticipantClass::Conventional,
                UnitId(9),
            ),
            BlockBid::new(
                "ignored".into(),
                8,
                4,
                30.0,
                5.0,
                Direction::Sell,
                ParticipantClass::Conventional,
                UnitId(9),
            ),
        ]
    }
}

struct Local {
    bids: Vec<(usize, Direction, f64, f64)>,
}

impl BidSource for Local {
    fn name(&self) -> &str {
        "local"
    }

    fn simple_bids(&self, _: &BidContext) -> Vec<SimpleBid> {
        self.bids
            .iter()
            .map(|&(hour, direction, price, volume)| {
                let class = match direction {
                    Direction::Sell => ParticipantClass::Conventional,
                    Direction::Ask => ParticipantClass::Demand,
                };
                SimpleBid::new("Z".into(), hour, price, volume, direction, class, UnitId(4))
            })
            .collect()
    }
}

fn sequences(auction: &AreaAuction) -> Vec<u64> {
    (0..HOURS_PER_DAY)
        .flat_map(|h| auction.curve(h).iter().map(|bid| bid.sequence))
        .collect()
}

#[tokio::test]
async fn pre_clear_is_reproducible() {
    let runner = PhaseRunner::current(true);
    let day = Day::new(2031, 40);
    let mut auction = AreaAuction::new(Area::new("X", "power"), PriceBounds::default(), 11);
    auction.add_participant(Arc::new(Crowd { units: 5 }));
    assert_eq!(auction.state(), AuctionState::Initial);

    auction
        .pre_clear(&runner, day, Arc::default())
        .await
        .unwrap();
    let first = sequences(&auction);
    auction
        .pre_clear(&runner, day, Arc::default())
        .await
        .unwrap();

    assert_eq!(auction.state(), AuctionState::BidsCollected);
    assert_eq!(auction.day(), Some(day));
    assert_eq!(first, sequences(&auction));
    assert_eq!(first.len(), 5 * HOURS_PER_DAY);

    let mut distinct = first.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), first.len());

    // the same seed replays the same order in a fresh auction
    let mut replay = AreaAuction::new(Area::new("X", "power"), PriceBounds::default(), 11);
    replay.add_participant(Arc::new(Crowd { units: 5 }));
    replay
        .pre_clear(&runner, day, Arc::new(ForecastSnapshot::default()))
        .await
        .unwrap();
    assert_eq!(first, sequences(&replay));
}

#[tokio::test]
async fn curves_follow_clearing_order() {
    let mut auction = AreaAuction::new(Area::new("X", "power"), PriceBounds::default(), 3);
    auction.add_participant(Arc::new(Crowd { units: 3 }));
    auction.add_participant(Arc::new(Local {
        bids: vec![
            (0, Direction::Sell, 40.0, 5.0),
            (0, Direction::Ask, 10.0, 50.0),
            (0, Direction::Sell, 25.0, 80.0),
        ],
    }));
    auction
        .pre_clear(&PhaseRunner::current(true), Day::new(2031, 0), Arc::default())
        .await
        .unwrap();

    let curve = auction.curve(0);
    assert_eq!(curve.len(), 6);
    assert!(curve.iter().all(|bid| bid.area.as_str() == "X"));
    for pair in curve.windows(2) {
        assert!(pair[0].clearing_order(&pair[1]).is_lt());
    }
    assert_eq!(curve[0].price, 10.0);
    // among equal prices, the larger volume comes first
    assert_eq!(curve[1].volume, 80.0);
}

#[tokio::test]
async fn invalid_bids_are_dropped() {
    let mut auction = AreaAuction::new(Area::new("X", "power"), PriceBounds::default(), 0);
    auction.add_participant(Arc::new(Sloppy));
    auction
        .pre_clear(&PhaseRunner::current(true), Day::new(2031, 0), Arc::default())
        .await
        .unwrap();

    let kept = auction
        .curve(3)
        .iter()
        .map(|bid| (bid.price, bid.volume, bid.class))
        .collect::<Vec<_>>();
    assert_eq!(
        kept,
        vec![
            (50.0, 10.0, ParticipantClass::Conventional),
            (50.0, 0.0, ParticipantClass::SeasonalStorage),
            (60.0, 0.0, ParticipantClass::PowerToHydrogen),
        ]
    );
    assert_eq!(auction.blocks().len(), 1);
    assert_eq!(auction.blocks()[0].start, 8);
    assert!(auction.has_bids());
}

#[test_log::test(tokio::test)]
async fn local_clearing_publishes_hourly_results() {
    let mut auction = AreaAuction::new(
        Area::new("Z", "power").isolated(),
        PriceBounds {
            min: 0.0,
            max: 100.0,
        },
        0,
    );
    auction.add_participant(Arc::new(Local {
        bids: vec![
            (0, Direction::Sell, 20.0, 100.0),
            (0, Direction::Ask, 80.0, 60.0),
            (1, Direction::Sell, 20.0, 10.0),
            (1, Direction::Ask, 80.0, 60.0),
        ],
    }));
    auction
        .pre_clear(&PhaseRunner::current(true), Day::new(2031, 0), Arc::default())
        .await
        .unwrap();
    auction.clear_local(&ClarabelSolver::default()).await.unwrap();

    assert!(auction.is_cleared());
    let result = auction.result().unwrap();
    assert!(!result.coupled);

    assert_eq!(result.hours[0].status, ClearingStatus::Cleared);
    assert_abs_diff_eq!(result.hours[0].price, 20.0, epsilon = 1e-3);
    assert_abs_diff_eq!(result.hours[0].volume, 60.0, epsilon = 1e-4);

    // short supply: demand sets the price
    assert_abs_diff_eq!(result.hours[1].price, 80.0, epsilon = 1e-3);
    assert_abs_diff_eq!(result.hours[1].volume, 10.0, epsilon = 1e-4);

    assert_eq!(result.hours[2].status, ClearingStatus::Invalid);
    assert_eq!(result.hours[2].price, 0.0);
    assert_eq!(result.hours[2].volume, 0.0);
}

#[tokio::test]
async fn published_prices_are_clamped() {
    let mut auction = AreaAuction::new(
        Area::new("Z", "power"),
        PriceBounds {
            min: 0.0,
            max: 100.0,
        },
        0,
    );
    auction.add_participant(Arc::new(Local {
        bids: (0..3).map(|h| (h, Direction::Sell, 20.0, 10.0)).collect(),
    }));
    auction
        .pre_clear(&PhaseRunner::current(true), Day::new(2031, 0), Arc::default())
        .await
        .unwrap();

    let (sold, bought) = auction.set_accepted_ratios(0, &[0.5]);
    assert_eq!((sold, bought), (5.0, 0.0));

    let mut prices = vec![150.0, -3.0, f64::NAN];
    prices.resize(HOURS_PER_DAY, 0.0);
    let zeros = vec![0.0; HOURS_PER_DAY];
    auction.publish_results(&prices, &zeros, &zeros, true);

    let result = auction.result().unwrap();
    assert!(result.coupled);
    assert_eq!(result.hours[0].price, 100.0);
    assert_eq!(result.hours[1].price, 0.0);
    assert_eq!(result.hours[2].status, ClearingStatus::Invalid);
    assert_eq!(result.hours[3].status, ClearingStatus::Invalid);

    auction.reset_accepted();
    assert_eq!(auction.state(), AuctionState::BidsCollected);
    assert!(auction.result().is_none());
    assert_eq!(auction.curve(0)[0].accepted_volume, 0.0);
}

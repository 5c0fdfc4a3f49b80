//! Adaptive per-connection bids.
//!
//! A bid is what we ask a downloading peer to pre-pay. Each connection keeps
//! its own bid and adjusts it like a reverse auction:
//!
//! - the peer calls a request too high: `bid × decrease_factor`
//! - the peer pays and we credit it: `bid × increase_factor`
//! - a charge fails: `bid = max(bid, charge)`
//!
//! so that the bid converges toward what the peer is willing to pay.

use portable_atomic::{AtomicU128, Ordering};
use tollgate_api::PaymentConfig;
use tollgate_primitives::Amount;

/// Current bid of one connection.
#[derive(Debug)]
pub struct Bid(AtomicU128);

impl Bid {
    fn new(amount: Amount) -> Self {
        Self(AtomicU128::new(amount.units()))
    }

    pub fn amount(&self) -> Amount {
        Amount::from_units(self.0.load(Ordering::Acquire))
    }

    fn update(&self, f: impl Fn(Amount) -> Amount) -> Amount {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |units| {
                Some(f(Amount::from_units(units)).units())
            })
            .unwrap_or_else(|units| units);
        f(Amount::from_units(previous))
    }
}

/// Seeds and adjusts connection bids.
#[derive(Debug, Clone, Copy)]
pub struct BidController {
    starting_bid: Amount,
    increase_factor: f64,
    decrease_factor: f64,
}

impl BidController {
    pub fn new(starting_bid: Amount, increase_factor: f64, decrease_factor: f64) -> Self {
        Self { starting_bid, increase_factor, decrease_factor }
    }

    pub fn from_config(config: &impl PaymentConfig) -> Self {
        Self::new(
            config.starting_bid(),
            config.bid_increase_factor(),
            config.bid_decrease_factor(),
        )
    }

    pub fn starting_bid(&self) -> Amount {
        self.starting_bid
    }

    /// Bid for a newly opened connection.
    pub fn open(&self) -> Bid {
        Bid::new(self.starting_bid)
    }

    /// The peer refused our payment request as too high.
    pub fn on_too_high(&self, bid: &Bid) -> Amount {
        bid.update(|amount| amount.scale(self.decrease_factor))
    }

    /// The peer paid us and was credited.
    pub fn on_payment_accepted(&self, bid: &Bid) -> Amount {
        bid.update(|amount| amount.scale(self.increase_factor))
    }

    /// A charge of `floor` failed; never bid less than it.
    pub fn raise_to_at_least(&self, bid: &Bid, floor: Amount) -> Amount {
        bid.update(|amount| amount.max(floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller() -> BidController {
        BidController::new(Amount::from_units(1_000_000), 1.5, 0.95)
    }

    #[test]
    fn test_bid_seeded_at_starting_bid() {
        let controller = controller();
        assert_eq!(controller.open().amount(), controller.starting_bid());
    }

    #[test]
    fn test_too_high_strictly_decreases() {
        let controller = controller();
        let bid = controller.open();
        let lowered = controller.on_too_high(&bid);
        assert_eq!(lowered, Amount::from_units(950_000));
        assert_eq!(bid.amount(), lowered);
    }

    #[test]
    fn test_accepted_strictly_increases() {
        let controller = controller();
        let bid = controller.open();
        assert_eq!(controller.on_payment_accepted(&bid), Amount::from_units(1_500_000));
    }

    #[test]
    fn test_tiny_bid_still_moves() {
        let controller = BidController::new(Amount::from_units(1), 1.5, 0.95);
        let bid = controller.open();
        assert_eq!(controller.on_payment_accepted(&bid), Amount::from_units(2));
        assert_eq!(controller.on_too_high(&bid), Amount::from_units(1));
    }

    #[test]
    fn test_raise_never_lowers() {
        let controller = controller();
        let bid = controller.open();
        assert_eq!(controller.raise_to_at_least(&bid, Amount::from_units(10)), controller.starting_bid());
        assert_eq!(
            controller.raise_to_at_least(&bid, Amount::from_units(5_000_000)),
            Amount::from_units(5_000_000)
        );
    }

    proptest! {
        #[test]
        fn prop_bids_move_strictly_with_the_factor(
            units in 1u128..=u64::MAX as u128,
            increase in 1.01f64..4.0,
            decrease in 0.01f64..0.99,
        ) {
            let controller = BidController::new(Amount::from_units(units), increase, decrease);

            let bid = controller.open();
            prop_assert!(controller.on_too_high(&bid) < Amount::from_units(units));

            let bid = controller.open();
            prop_assert!(controller.on_payment_accepted(&bid) > Amount::from_units(units));
        }
    }
}

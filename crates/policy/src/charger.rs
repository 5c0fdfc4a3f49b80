//! Request charger.
//!
//! Every data request from a peer is paid for out of its pre-paid balance
//! before we serve it. A connection is unchoked only by a successful
//! charge (or an incoming payment, handled by the engine); a failed charge
//! chokes it and asks the peer to pre-pay.
//!
//! ```text
//!            charge ok
//!   CHOKED ────────────▶ UNCHOKED
//!      ▲                    │
//!      └────────────────────┘
//!        charge failed / force choke
//! ```

use tollgate_accounting::{ChargeOutcome, PeerBalance, Sufficiency, TorrentEconomics};
use tollgate_api::{PaymentConfig, Wire};
use tollgate_primitives::Amount;
use tracing::{debug, trace};

use crate::{Bid, BidController, FixedPricer, Pricer};

/// What the charger did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeDecision {
    /// The request was paid for and the connection unchoked.
    Served {
        /// Amount debited.
        charged: Amount,
        /// Balance left after the debit.
        remaining: Amount,
        /// A low-balance notice was sent.
        low_balance: bool,
    },
    /// The balance was too low; the connection was choked and the peer
    /// asked to pre-pay.
    PaymentRequested {
        /// Amount the request would have cost.
        required: Amount,
        /// Amount we asked the peer for.
        requested: Amount,
        /// Balance at the time of the attempt.
        balance: Amount,
    },
}

/// Everything a request is charged against.
#[derive(Clone, Copy)]
pub struct ChargeContext<'a> {
    /// Connection the request arrived on.
    pub wire: &'a dyn Wire,
    /// Balance the request is charged against.
    pub balance: &'a PeerBalance,
    /// Bid used when asking the peer for payment.
    pub bid: &'a Bid,
    /// Economics credited with what is earned.
    pub torrent: &'a TorrentEconomics,
}

/// Charges data requests against peer balances.
#[derive(Debug, Clone)]
pub struct RequestCharger<P = FixedPricer> {
    pricer: P,
    bids: BidController,
    min_ledger_amount: Amount,
}

impl RequestCharger<FixedPricer> {
    pub fn from_config(config: &impl PaymentConfig) -> Self {
        Self::new(
            FixedPricer::from_config(config),
            BidController::from_config(config),
            config.min_ledger_amount(),
        )
    }
}

impl<P: Pricer> RequestCharger<P> {
    /// Charger pricing with `pricer`; payment requests never ask for less
    /// than `min_ledger_amount`.
    pub fn new(pricer: P, bids: BidController, min_ledger_amount: Amount) -> Self {
        Self { pricer, bids, min_ledger_amount }
    }

    /// Pricer used for every request.
    pub fn pricer(&self) -> &P {
        &self.pricer
    }

    /// Charge a request for `bytes` and apply the resulting choke state.
    ///
    /// The balance must strictly exceed the charge, so concurrent requests
    /// on different connections of one peer can never both drain the last
    /// of its credit.
    pub fn handle_request(&self, ctx: ChargeContext<'_>, bytes: u64) -> ChargeDecision {
        let peer = ctx.balance.peer();
        let required = self.pricer.price_for(bytes);

        if required.is_zero() {
            ctx.wire.unchoke();
            return ChargeDecision::Served {
                charged: Amount::ZERO,
                remaining: ctx.balance.balance(),
                low_balance: false,
            };
        }

        match ctx.balance.try_charge(required, Sufficiency::Exceeds) {
            ChargeOutcome::Charged { remaining } => {
                ctx.torrent.add_earned(required);
                ctx.wire.unchoke();

                let low_balance = remaining < required;
                if low_balance {
                    ctx.wire.send_low_balance(remaining);
                }
                trace!(peer = %peer.short(), conn = %ctx.wire.id(), bytes, %required, %remaining, "Charged request");

                ChargeDecision::Served { charged: required, remaining, low_balance }
            }
            ChargeOutcome::Insufficient { balance } => {
                let bid = self.bids.raise_to_at_least(ctx.bid, required);
                let requested = bid.max(self.min_ledger_amount);
                ctx.wire.send_payment_request(requested);
                ctx.wire.force_choke();
                debug!(
                    peer = %peer.short(),
                    conn = %ctx.wire.id(),
                    bytes,
                    %required,
                    %balance,
                    %requested,
                    "Insufficient balance, requesting payment"
                );

                ChargeDecision::PaymentRequested { required, requested, balance }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tollgate_primitives::PriceUnit;
    use tollgate_test_utils::{MockWire, WireCall, amount, test_info_hash, test_peer};

    fn charger() -> RequestCharger {
        RequestCharger::new(
            FixedPricer::new(amount("0.0001"), PriceUnit::Byte),
            BidController::new(amount("0.01"), 1.5, 0.95),
            amount("0.0001"),
        )
    }

    struct Fixture {
        wire: std::sync::Arc<MockWire>,
        balance: PeerBalance,
        bid: Bid,
        torrent: TorrentEconomics,
    }

    impl Fixture {
        fn new(charger: &RequestCharger) -> Self {
            Self {
                wire: MockWire::new(),
                balance: PeerBalance::new(test_peer(1)),
                bid: charger.bids.open(),
                torrent: TorrentEconomics::new(test_info_hash(1)),
            }
        }

        fn ctx(&self) -> ChargeContext<'_> {
            ChargeContext {
                wire: self.wire.as_ref(),
                balance: &self.balance,
                bid: &self.bid,
                torrent: &self.torrent,
            }
        }
    }

    #[test]
    fn test_zero_balance_chokes_and_requests_payment() {
        let charger = charger();
        let fixture = Fixture::new(&charger);

        let decision = charger.handle_request(fixture.ctx(), 1000);

        assert_eq!(
            decision,
            ChargeDecision::PaymentRequested {
                required: amount("0.1"),
                requested: amount("0.1"),
                balance: Amount::ZERO,
            }
        );
        assert_eq!(
            fixture.wire.calls(),
            vec![WireCall::PaymentRequest(amount("0.1")), WireCall::ForceChoke]
        );
        assert!(fixture.wire.is_choked());
        assert_eq!(fixture.bid.amount(), amount("0.1"));
        assert_eq!(fixture.torrent.total_earned(), Amount::ZERO);
    }

    #[test]
    fn test_request_floor_is_min_ledger_amount() {
        let charger = RequestCharger::new(
            FixedPricer::new(amount("0.000001"), PriceUnit::Byte),
            BidController::new(amount("0.00001"), 1.5, 0.95),
            amount("0.0001"),
        );
        let fixture = Fixture::new(&charger);

        let decision = charger.handle_request(fixture.ctx(), 10);
        assert_matches!(decision, ChargeDecision::PaymentRequested { requested, .. } if requested == amount("0.0001"));
    }

    #[test]
    fn test_funded_request_unchokes_and_records_earned() {
        let charger = charger();
        let fixture = Fixture::new(&charger);
        fixture.balance.credit(amount("1"));

        let decision = charger.handle_request(fixture.ctx(), 1000);

        assert_eq!(
            decision,
            ChargeDecision::Served { charged: amount("0.1"), remaining: amount("0.9"), low_balance: false }
        );
        assert!(!fixture.wire.is_choked());
        assert_eq!(fixture.torrent.total_earned(), amount("0.1"));
    }

    #[test]
    fn test_low_balance_notice() {
        let charger = charger();
        let fixture = Fixture::new(&charger);
        fixture.balance.credit(amount("0.15"));

        let decision = charger.handle_request(fixture.ctx(), 1000);

        assert_matches!(decision, ChargeDecision::Served { low_balance: true, .. });
        assert_eq!(fixture.wire.count(&WireCall::LowBalance(amount("0.05"))), 1);
    }

    #[test]
    fn test_two_requests_against_exact_balance_charge_once() {
        let charger = charger();
        let fixture = Fixture::new(&charger);
        fixture.balance.credit(amount("0.1"));
        let other = MockWire::new();

        let first = charger.handle_request(fixture.ctx(), 500);
        let second = charger.handle_request(ChargeContext { wire: other.as_ref(), ..fixture.ctx() }, 500);

        assert_matches!(first, ChargeDecision::Served { .. });
        assert_matches!(second, ChargeDecision::PaymentRequested { .. });
        assert_eq!(fixture.balance.balance(), amount("0.05"));
        assert!(other.is_choked());
    }

    #[test]
    fn test_zero_byte_request_is_free() {
        let charger = charger();
        let fixture = Fixture::new(&charger);

        let decision = charger.handle_request(fixture.ctx(), 0);
        assert_matches!(decision, ChargeDecision::Served { charged, .. } if charged.is_zero());
        assert!(!fixture.wire.is_choked());
    }
}

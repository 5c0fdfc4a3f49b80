//! Per-peer balance ledger and transfer economics.
//!
//! # Components
//!
//! - [`PeerBalance`] - Atomic per-peer credit balance
//! - [`Accounting`] - Arena of peers and transfers, keyed by identity
//! - [`PaymentReservation`] - Reserve/commit/rollback for outgoing payments

mod action;
mod error;
mod peer;

pub use action::PaymentReservation;
pub use error::AccountingError;
pub use peer::{ChargeOutcome, PeerBalance, Sufficiency};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tollgate_primitives::{AccountId, Amount, InfoHash, PaymentId, PeerIdentity};

use crate::{DeliveryRecord, DeliveryTracker, Filter, PaymentRecord, RateLimited, TorrentEconomics};

/// Owner of all mutable accounting state.
///
/// Balances are shared by every connection to a peer; transfer economics are
/// shared by every connection of a transfer. Handlers receive a reference to
/// this object instead of touching ambient maps.
pub struct Accounting {
    peers: RwLock<HashMap<PeerIdentity, Arc<PeerBalance>>>,
    torrents: RwLock<HashMap<InfoHash, Arc<TorrentEconomics>>>,
    tracker: Arc<DeliveryTracker>,
}

impl Accounting {
    /// Create accounting that remembers outgoing payment times for
    /// `payment_history` (at least the payment rate-limit window).
    pub fn new(payment_history: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            torrents: RwLock::new(HashMap::new()),
            tracker: Arc::new(DeliveryTracker::new(payment_history)),
        }
    }

    /// Delivery/spend history.
    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    /// Get or create peer balance (double-checked locking).
    pub fn get_or_create_peer(&self, peer: PeerIdentity) -> Arc<PeerBalance> {
        // Fast path: read lock
        if let Some(state) = self.peers.read().get(&peer) {
            return Arc::clone(state);
        }

        // Slow path: write lock
        self.peers
            .write()
            .entry(peer)
            .or_insert_with(|| Arc::new(PeerBalance::new(peer)))
            .clone()
    }

    /// Current balance of `peer`, zero if never seen.
    pub fn balance_of(&self, peer: &PeerIdentity) -> Amount {
        self.peers.read().get(peer).map(|state| state.balance()).unwrap_or_default()
    }

    /// Debit `amount` from `peer` if its balance covers it.
    pub fn charge(&self, peer: PeerIdentity, amount: Amount) -> bool {
        self.try_charge(peer, amount, Sufficiency::Covers).is_charged()
    }

    /// Debit `amount` from `peer` under the given sufficiency rule.
    pub fn try_charge(&self, peer: PeerIdentity, amount: Amount, rule: Sufficiency) -> ChargeOutcome {
        self.get_or_create_peer(peer).try_charge(amount, rule)
    }

    /// Add settlement-confirmed credit to `peer`; returns the new balance.
    ///
    /// No deduplication: callers must not deliver the same settlement twice.
    pub fn credit(&self, peer: PeerIdentity, amount: Amount) -> Amount {
        self.get_or_create_peer(peer).credit(amount)
    }

    /// Snapshot of every known peer balance.
    pub fn balances(&self) -> Vec<(PeerIdentity, Amount)> {
        self.peers.read().iter().map(|(peer, state)| (*peer, state.balance())).collect()
    }

    /// List all peers with a balance entry.
    pub fn peers(&self) -> Vec<PeerIdentity> {
        self.peers.read().keys().copied().collect()
    }

    /// Drop a peer's balance and history.
    pub fn forget_peer(&self, peer: &PeerIdentity) {
        self.peers.write().remove(peer);
        self.tracker.forget(Filter::peer(*peer));
    }

    /// Get or create the economics of a transfer.
    pub fn open_torrent(&self, info_hash: InfoHash) -> Arc<TorrentEconomics> {
        if let Some(torrent) = self.torrents.read().get(&info_hash) {
            return Arc::clone(torrent);
        }

        self.torrents
            .write()
            .entry(info_hash)
            .or_insert_with(|| Arc::new(TorrentEconomics::new(info_hash)))
            .clone()
    }

    /// Economics of a transfer, if open.
    pub fn torrent(&self, info_hash: &InfoHash) -> Option<Arc<TorrentEconomics>> {
        self.torrents.read().get(info_hash).cloned()
    }

    /// Discard a transfer's economics and history.
    pub fn forget_torrent(&self, info_hash: &InfoHash) {
        self.torrents.write().remove(info_hash);
        self.tracker.forget(Filter::torrent(*info_hash));
    }

    /// Record bytes `peer` delivered to us for `info_hash`.
    pub fn record_delivery(&self, peer: PeerIdentity, info_hash: InfoHash, bytes: u64, at: Instant) {
        self.tracker.record_delivery(DeliveryRecord { peer, torrent: info_hash, bytes, at });
        self.open_torrent(info_hash).add_downloaded(peer, bytes);
    }

    /// Record an amount earned by serving `info_hash`.
    pub fn record_earned(&self, info_hash: InfoHash, amount: Amount) -> Amount {
        self.open_torrent(info_hash).add_earned(amount)
    }

    /// Optimistically record an outgoing payment, unless `max` payments to
    /// the same peer and transfer already fall inside `window`.
    pub fn reserve_payment(
        &self,
        peer: PeerIdentity,
        info_hash: InfoHash,
        amount: Amount,
        destination: AccountId,
        at: Instant,
        window: Duration,
        max: usize,
    ) -> Result<PaymentReservation, RateLimited> {
        let record = PaymentRecord {
            id: PaymentId::next(),
            peer,
            torrent: info_hash,
            amount,
            destination,
            at,
        };
        self.tracker.reserve_within_limit(record.clone(), window, max)?;
        Ok(PaymentReservation::new(record, Arc::clone(&self.tracker), self.open_torrent(info_hash)))
    }
}

impl std::fmt::Debug for Accounting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accounting")
            .field("peers", &self.peers.read().len())
            .field("torrents", &self.torrents.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_peer() -> PeerIdentity {
        PeerIdentity::new([1u8; 32])
    }

    fn test_torrent() -> InfoHash {
        InfoHash::from([7u8; 20])
    }

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn test_accounting() -> Accounting {
        Accounting::new(Duration::from_secs(60))
    }

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn test_unseen_peer_has_zero_balance() {
        let accounting = test_accounting();
        assert_eq!(accounting.balance_of(&test_peer()), Amount::ZERO);
        assert!(accounting.peers().is_empty());
    }

    #[test]
    fn test_charge_and_credit() {
        let accounting = test_accounting();
        let peer = test_peer();

        assert!(!accounting.charge(peer, amount("0.1")));
        accounting.credit(peer, amount("0.5"));
        assert!(accounting.charge(peer, amount("0.1")));
        assert_eq!(accounting.balance_of(&peer), amount("0.4"));
    }

    #[test]
    fn test_handles_share_balance() {
        let accounting = test_accounting();
        let first = accounting.get_or_create_peer(test_peer());
        let second = accounting.get_or_create_peer(test_peer());

        first.credit(amount("1"));
        assert_eq!(second.balance(), amount("1"));
    }

    #[test]
    fn test_reservation_commit_keeps_totals() {
        let accounting = test_accounting();
        let now = Instant::now();

        let reservation = accounting
            .reserve_payment(test_peer(), test_torrent(), amount("0.3"), "a".into(), now, WINDOW, 3)
            .unwrap();
        reservation.commit();

        let torrent = accounting.torrent(&test_torrent()).unwrap();
        assert_eq!(torrent.total_spent(), amount("0.3"));
        assert_eq!(accounting.tracker().total_sent(Filter::peer(test_peer())), amount("0.3"));
        assert!(accounting.tracker().in_flight(Filter::default()).is_empty());
    }

    #[test]
    fn test_reservation_rollback_is_exact() {
        let accounting = test_accounting();
        let now = Instant::now();

        accounting
            .reserve_payment(test_peer(), test_torrent(), amount("0.2"), "a".into(), now, WINDOW, 3)
            .unwrap()
            .commit();
        let torrent = accounting.open_torrent(test_torrent());
        let spent_before = torrent.total_spent();
        let sent_before = accounting.tracker().total_sent(Filter::peer(test_peer()));

        let reservation = accounting
            .reserve_payment(test_peer(), test_torrent(), amount("0.7"), "a".into(), now, WINDOW, 3)
            .unwrap();
        assert_eq!(torrent.total_spent(), amount("0.9"));
        assert_eq!(torrent.spent_on(&test_peer()), amount("0.9"));
        reservation.rollback();

        assert_eq!(torrent.total_spent(), spent_before);
        assert_eq!(torrent.spent_on(&test_peer()), spent_before);
        assert_eq!(accounting.tracker().total_sent(Filter::peer(test_peer())), sent_before);
    }

    #[test]
    fn test_dropped_reservation_rolls_back() {
        let accounting = test_accounting();
        {
            let _reservation = accounting
                .reserve_payment(
                    test_peer(),
                    test_torrent(),
                    amount("0.7"),
                    "a".into(),
                    Instant::now(),
                    WINDOW,
                    3,
                )
                .unwrap();
        }
        assert_eq!(accounting.tracker().total_sent(Filter::default()), Amount::ZERO);
        assert_eq!(accounting.open_torrent(test_torrent()).total_spent(), Amount::ZERO);
    }

    #[test]
    fn test_record_delivery_updates_torrent() {
        let accounting = test_accounting();
        accounting.record_delivery(test_peer(), test_torrent(), 4096, Instant::now());

        let torrent = accounting.torrent(&test_torrent()).unwrap();
        assert_eq!(torrent.bytes_from(&test_peer()), 4096);
        assert_eq!(accounting.tracker().bytes_delivered(Filter::default()), 4096);
    }

    #[test]
    fn test_forget_torrent() {
        let accounting = test_accounting();
        accounting.record_delivery(test_peer(), test_torrent(), 10, Instant::now());
        accounting.forget_torrent(&test_torrent());

        assert!(accounting.torrent(&test_torrent()).is_none());
        assert_eq!(accounting.tracker().bytes_delivered(Filter::default()), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Charge(u64),
        Credit(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(0u64..1_000).prop_map(Op::Charge), (0u64..1_000).prop_map(Op::Credit)]
    }

    proptest! {
        #[test]
        fn prop_balance_never_negative(ops in proptest::collection::vec(op(), 0..64)) {
            let accounting = test_accounting();
            let peer = test_peer();
            let mut expected: u128 = 0;

            for op in ops {
                match op {
                    Op::Credit(units) => {
                        accounting.credit(peer, Amount::from_units(units as u128));
                        expected += units as u128;
                    }
                    Op::Charge(units) => {
                        let charged = accounting.charge(peer, Amount::from_units(units as u128));
                        prop_assert_eq!(charged, expected >= units as u128);
                        if charged {
                            expected -= units as u128;
                        }
                    }
                }
                prop_assert_eq!(accounting.balance_of(&peer).units(), expected);
            }
        }
    }
}

//! Payment decider.
//!
//! Decides whether to pay a peer that asked us to pre-pay. The decision
//! never models what the data is worth; it only gates on verified history:
//!
//! 1. Normalize the requested amount into our unit.
//! 2. Record the request.
//! 3. Refuse if we have paid the peer for this transfer and received
//!    nothing (non-finite cost per byte).
//! 4. Refuse if the recent payment rate to the peer for this transfer has
//!    reached the limit.
//! 5. Otherwise reserve the spend, submit, then commit or roll back.
//!
//! The worst-case loss to a non-delivering peer is thereby bounded by a few
//! payments per window.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tollgate_accounting::{Accounting, Filter, PaymentRequestRecord, PaymentReservation, RateLimited};
use tollgate_api::{Memo, PaymentConfig, PaymentParams, PaymentReceipt, Settlement, SettlementError};
use tollgate_primitives::{AccountId, Amount, InfoHash, PaymentId, PeerIdentity};
use tracing::{debug, info, warn};

/// A peer asked us to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub peer: PeerIdentity,
    /// Account the peer wants to be paid on.
    pub destination: AccountId,
    pub torrent: InfoHash,
    /// Requested amount, in the peer's unit.
    pub destination_amount: Amount,
    /// Bytes of the transfer we still need.
    pub bytes_remaining: u64,
}

/// Why a payment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RefusalReason {
    /// We paid the peer for this transfer but received no data from it.
    #[error("paid {total_sent} without receiving any data")]
    NonDeliveringPeer {
        /// Amount already sent.
        total_sent: Amount,
    },
    /// Too many payments to the peer for this transfer within the window.
    #[error("{recent} payments within the window (max {max})")]
    RateLimited {
        /// Payments already inside the window.
        recent: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Result of [`PaymentDecider::decide`].
#[derive(Debug)]
pub enum PaymentDecision {
    /// Pay; the spend is already counted.
    Approved(PaymentReservation),
    /// Do not pay.
    Refused(RefusalReason),
}

/// Final outcome of handling one payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The ledger accepted the payment.
    Paid {
        id: PaymentId,
        amount: Amount,
        receipt: PaymentReceipt,
    },
    /// The decider refused to pay.
    Refused(RefusalReason),
    /// Normalization failed; nothing was counted as spent.
    Abandoned(SettlementError),
    /// Submission failed; the reserved spend was rolled back.
    Failed {
        id: PaymentId,
        amount: Amount,
        error: SettlementError,
    },
    /// An earlier payment to the same peer is still outstanding.
    InFlight,
}

/// Marks a peer as having a payment outstanding until dropped.
struct InFlightGuard<'a> {
    peers: &'a Mutex<HashSet<PeerIdentity>>,
    peer: PeerIdentity,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.peers.lock().remove(&self.peer);
    }
}

/// Decides on and submits payments to peers we download from.
pub struct PaymentDecider<S> {
    accounting: Arc<Accounting>,
    settlement: S,
    local: PeerIdentity,
    window: Duration,
    max_per_window: usize,
    guard_in_flight: bool,
    in_flight: Mutex<HashSet<PeerIdentity>>,
}

impl<S: Settlement> PaymentDecider<S> {
    /// `local` is our own identity, attached to payments so the recipient
    /// can credit us.
    pub fn new(
        accounting: Arc<Accounting>,
        settlement: S,
        local: PeerIdentity,
        config: &impl PaymentConfig,
    ) -> Self {
        Self {
            accounting,
            settlement,
            local,
            window: config.payment_window(),
            max_per_window: config.max_payments_per_window(),
            guard_in_flight: config.guard_in_flight_payments(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a payment to `peer` is outstanding.
    pub fn is_in_flight(&self, peer: &PeerIdentity) -> bool {
        self.in_flight.lock().contains(peer)
    }

    /// Record a normalized request and decide on it.
    ///
    /// On approval the payment is already counted as sent and spent; the
    /// returned reservation must be committed or rolled back.
    pub fn decide(&self, request: &PaymentRequest, source_amount: Amount, now: Instant) -> PaymentDecision {
        let tracker = self.accounting.tracker();
        let pair = Filter::pair(request.peer, request.torrent);

        tracker.record_payment_request(PaymentRequestRecord {
            peer: request.peer,
            torrent: request.torrent,
            destination_amount: request.destination_amount,
            source_amount,
            bytes_remaining: request.bytes_remaining,
            at: now,
        });

        let cost_per_byte = tracker.cost_per_byte(pair);
        if !cost_per_byte.is_finite() {
            return PaymentDecision::Refused(RefusalReason::NonDeliveringPeer {
                total_sent: tracker.total_sent(pair),
            });
        }

        match self.accounting.reserve_payment(
            request.peer,
            request.torrent,
            source_amount,
            request.destination.clone(),
            now,
            self.window,
            self.max_per_window,
        ) {
            Ok(reservation) => {
                debug!(
                    peer = %request.peer.short(),
                    info_hash = %request.torrent,
                    %source_amount,
                    cost_per_byte,
                    "Approved payment"
                );
                PaymentDecision::Approved(reservation)
            }
            Err(RateLimited { recent }) => {
                PaymentDecision::Refused(RefusalReason::RateLimited { recent, max: self.max_per_window })
            }
        }
    }

    /// Handle a payment request end to end.
    ///
    /// Waits on settlement for normalization and submission; callers run
    /// this on its own task.
    pub async fn handle_payment_request(&self, request: PaymentRequest) -> PaymentOutcome {
        let _guard = if self.guard_in_flight {
            if !self.in_flight.lock().insert(request.peer) {
                debug!(peer = %request.peer.short(), "Payment already in flight, skipping request");
                return PaymentOutcome::InFlight;
            }
            Some(InFlightGuard { peers: &self.in_flight, peer: request.peer })
        } else {
            None
        };

        let source_amount = match self
            .settlement
            .normalize_amount(&request.destination, request.destination_amount)
            .await
        {
            Ok(amount) => amount,
            Err(error) => {
                warn!(
                    peer = %request.peer.short(),
                    destination = %request.destination,
                    amount = %request.destination_amount,
                    %error,
                    "Could not normalize requested amount"
                );
                return PaymentOutcome::Abandoned(error);
            }
        };

        let reservation = match self.decide(&request, source_amount, Instant::now()) {
            PaymentDecision::Approved(reservation) => reservation,
            PaymentDecision::Refused(reason) => {
                info!(
                    peer = %request.peer.short(),
                    info_hash = %request.torrent,
                    amount = %source_amount,
                    %reason,
                    "Refused payment"
                );
                return PaymentOutcome::Refused(reason);
            }
        };

        let id = reservation.id();
        let params = PaymentParams {
            source_amount,
            destination_account: request.destination.clone(),
            destination_memo: Memo::tag(&self.local),
            source_memo: Memo::tag(&request.peer),
        };

        match self.settlement.send_payment(params).await {
            Ok(receipt) => {
                reservation.commit();
                info!(
                    %id,
                    peer = %request.peer.short(),
                    amount = %source_amount,
                    reference = %receipt.reference,
                    "Payment sent"
                );
                PaymentOutcome::Paid { id, amount: source_amount, receipt }
            }
            Err(error) => {
                reservation.rollback();
                warn!(%id, peer = %request.peer.short(), amount = %source_amount, %error, "Payment failed");
                PaymentOutcome::Failed { id, amount: source_amount, error }
            }
        }
    }
}

impl<S> std::fmt::Debug for PaymentDecider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentDecider")
            .field("local", &self.local)
            .field("window", &self.window)
            .field("max_per_window", &self.max_per_window)
            .field("guard_in_flight", &self.guard_in_flight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::sync::Notify;
    use tollgate_api::LedgerError;
    use tollgate_test_utils::{amount, test_info_hash, test_peer};

    use crate::DefaultPaymentConfig;

    /// Settlement that quotes 1:1 and records submissions.
    #[derive(Default)]
    struct TestSettlement {
        fail_normalize: bool,
        fail_send: bool,
        release: Option<Arc<Notify>>,
        sent: Mutex<Vec<PaymentParams>>,
    }

    #[async_trait::async_trait]
    impl Settlement for TestSettlement {
        async fn normalize_amount(
            &self,
            destination: &AccountId,
            destination_amount: Amount,
        ) -> Result<Amount, SettlementError> {
            if self.fail_normalize {
                return Err(SettlementError::Normalization(LedgerError::NoRoute {
                    destination: destination.to_string(),
                }));
            }
            Ok(destination_amount)
        }

        async fn send_payment(&self, params: PaymentParams) -> Result<PaymentReceipt, SettlementError> {
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.sent.lock().push(params);
            if self.fail_send {
                return Err(SettlementError::Submission(LedgerError::Rejected("no funds".into())));
            }
            Ok(PaymentReceipt { reference: "ref".into() })
        }
    }

    fn decider(settlement: TestSettlement) -> PaymentDecider<TestSettlement> {
        let accounting = Arc::new(Accounting::new(Duration::from_secs(60)));
        PaymentDecider::new(accounting, settlement, test_peer(0), &DefaultPaymentConfig)
    }

    fn request(destination_amount: &str) -> PaymentRequest {
        PaymentRequest {
            peer: test_peer(1),
            destination: "seeder".into(),
            torrent: test_info_hash(1),
            destination_amount: amount(destination_amount),
            bytes_remaining: 1 << 20,
        }
    }

    fn pair() -> Filter {
        Filter::pair(test_peer(1), test_info_hash(1))
    }

    #[tokio::test]
    async fn test_first_payment_is_approved_and_committed() {
        let decider = decider(TestSettlement::default());

        let outcome = decider.handle_payment_request(request("0.1")).await;

        assert_matches!(outcome, PaymentOutcome::Paid { amount: paid, .. } if paid == amount("0.1"));
        let tracker = decider.accounting.tracker();
        assert_eq!(tracker.total_sent(pair()), amount("0.1"));
        assert_eq!(tracker.payment_requests(pair()), 1);
        assert!(tracker.in_flight(Filter::default()).is_empty());

        let sent = decider.settlement.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination_memo, Memo::tag(&test_peer(0)));
        assert_eq!(sent[0].source_memo, Memo::tag(&test_peer(1)));
        assert!(!decider.is_in_flight(&test_peer(1)));
    }

    #[tokio::test]
    async fn test_refuses_non_delivering_peer() {
        let decider = decider(TestSettlement::default());

        decider.handle_payment_request(request("0.1")).await;
        let outcome = decider.handle_payment_request(request("0.1")).await;

        assert_eq!(
            outcome,
            PaymentOutcome::Refused(RefusalReason::NonDeliveringPeer { total_sent: amount("0.1") })
        );
    }

    #[tokio::test]
    async fn test_pays_again_after_delivery() {
        let decider = decider(TestSettlement::default());

        decider.handle_payment_request(request("0.1")).await;
        decider.accounting.record_delivery(test_peer(1), test_info_hash(1), 1000, Instant::now());
        let outcome = decider.handle_payment_request(request("0.1")).await;

        assert_matches!(outcome, PaymentOutcome::Paid { .. });
        assert_eq!(decider.accounting.tracker().total_sent(pair()), amount("0.2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_window() {
        let decider = decider(TestSettlement::default());
        decider.accounting.record_delivery(test_peer(1), test_info_hash(1), 1000, Instant::now());

        for _ in 0..3 {
            assert_matches!(decider.handle_payment_request(request("0.01")).await, PaymentOutcome::Paid { .. });
        }
        assert_eq!(
            decider.handle_payment_request(request("0.01")).await,
            PaymentOutcome::Refused(RefusalReason::RateLimited { recent: 3, max: 3 })
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_matches!(decider.handle_payment_request(request("0.01")).await, PaymentOutcome::Paid { .. });
    }

    #[tokio::test]
    async fn test_normalization_failure_spends_nothing() {
        let decider = decider(TestSettlement { fail_normalize: true, ..Default::default() });

        let outcome = decider.handle_payment_request(request("0.1")).await;

        assert_matches!(outcome, PaymentOutcome::Abandoned(SettlementError::Normalization(_)));
        let tracker = decider.accounting.tracker();
        assert_eq!(tracker.total_sent(pair()), Amount::ZERO);
        assert_eq!(tracker.payment_requests(pair()), 0);
        assert!(!decider.is_in_flight(&test_peer(1)));
    }

    #[tokio::test]
    async fn test_submission_failure_rolls_back_exactly() {
        let decider = decider(TestSettlement { fail_send: true, ..Default::default() });
        let torrent = decider.accounting.open_torrent(test_info_hash(1));
        let sent_before = decider.accounting.tracker().total_sent(pair());
        let spent_before = torrent.total_spent();

        let outcome = decider.handle_payment_request(request("0.3")).await;

        assert_matches!(outcome, PaymentOutcome::Failed { amount: failed, .. } if failed == amount("0.3"));
        assert_eq!(decider.accounting.tracker().total_sent(pair()), sent_before);
        assert_eq!(torrent.total_spent(), spent_before);
        assert_eq!(decider.accounting.tracker().payments_within(pair(), Duration::from_secs(5), Instant::now()), 0);
    }

    #[tokio::test]
    async fn test_in_flight_guard_skips_concurrent_request() {
        let release = Arc::new(Notify::new());
        let decider = Arc::new(decider(TestSettlement {
            release: Some(release.clone()),
            ..Default::default()
        }));

        let pending = tokio::spawn({
            let decider = decider.clone();
            async move { decider.handle_payment_request(request("0.1")).await }
        });
        while !decider.is_in_flight(&test_peer(1)) {
            tokio::task::yield_now().await;
        }

        assert_eq!(decider.handle_payment_request(request("0.1")).await, PaymentOutcome::InFlight);

        release.notify_one();
        assert_matches!(pending.await.unwrap(), PaymentOutcome::Paid { .. });
        assert!(!decider.is_in_flight(&test_peer(1)));
    }

    #[test]
    fn test_decide_counts_spend_before_submission() {
        let decider = decider(TestSettlement::default());
        let now = Instant::now();

        let decision = decider.decide(&request("0.2"), amount("0.25"), now);
        let PaymentDecision::Approved(reservation) = decision else {
            panic!("expected approval");
        };
        assert_eq!(decider.accounting.tracker().total_sent(pair()), amount("0.25"));
        assert_eq!(decider.accounting.open_torrent(test_info_hash(1)).total_spent(), amount("0.25"));

        reservation.rollback();
        assert_eq!(decider.accounting.tracker().total_sent(pair()), Amount::ZERO);
    }
}

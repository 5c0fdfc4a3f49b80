//! Settlement client adapter.
//!
//! Wraps a [`LedgerClient`] for the payment core: readiness, amount
//! normalization with a rate cache, payment submission, and classification
//! of ledger notifications into incoming and outgoing settlements.
//!
//! # Actor Pattern
//!
//! This crate implements the Handle+Service actor pattern:
//! - [`SettlementService`] runs in its own tokio task, owns the ledger
//!   client's notification feed and the rate cache
//! - [`SettlementHandle`] is cheap-to-clone, implements
//!   [`Settlement`](tollgate_api::Settlement) and publishes
//!   [`SettlementEvent`]s to subscribers
//!
//! Use [`create_settlement_actor`] to create the service and handle pair.
//!
//! # Readiness
//!
//! [`SettlementHandle::connect`] resolves our account and subscribes to
//! notifications; [`SettlementEvent::Ready`] is published exactly once.
//! Normalization and submission issued earlier wait until then.
//!
//! # Correlation tags
//!
//! Payments carry a memo `{"public_key": "0x…"}` naming the payer. An
//! incoming settlement whose memo is missing or does not parse is ignored.

mod events;
mod handle;
mod memo;
mod metrics;
mod rates;
mod service;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tollgate_api::{LedgerClient, PaymentConfig};

pub use events::SettlementEvent;
pub use handle::SettlementHandle;
pub use service::{SettlementCommand, SettlementService};
pub use tollgate_api::SettlementError;

/// Capacity of the settlement event channel.
pub const SETTLEMENT_EVENT_CAPACITY: usize = 256;

/// Create a settlement actor (service and handle pair).
///
/// The service should be spawned as a background task; it stops once every
/// handle has been dropped.
pub fn create_settlement_actor<L: LedgerClient>(
    ledger: Arc<L>,
    config: &impl PaymentConfig,
) -> (SettlementService<L>, SettlementHandle) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = watch::channel(None);
    let (events_tx, _) = broadcast::channel(SETTLEMENT_EVENT_CAPACITY);

    let service = SettlementService::new(
        ledger,
        command_rx,
        ready_tx,
        events_tx.clone(),
        rates::RateCache::from_config(config),
    );
    let handle = SettlementHandle::new(command_tx, ready_rx, events_tx);

    (service, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tollgate_api::{LedgerError, Memo, PaymentParams, Settlement};
    use tollgate_policy::DefaultPaymentConfig;
    use tollgate_primitives::AccountId;
    use tollgate_test_utils::{MockLedger, amount, init_test_tracing, test_peer};

    fn spawn_actor(ledger: &Arc<MockLedger>) -> SettlementHandle {
        init_test_tracing();
        let (service, handle) = create_settlement_actor(Arc::clone(ledger), &DefaultPaymentConfig);
        tokio::spawn(service.into_task());
        handle
    }

    fn params(to: &str, amount_str: &str) -> PaymentParams {
        PaymentParams {
            source_amount: amount(amount_str),
            destination_account: to.into(),
            destination_memo: Memo::tag(&test_peer(0)),
            source_memo: Memo::tag(&test_peer(1)),
        }
    }

    #[tokio::test]
    async fn test_ready_event_emitted_once() {
        let ledger = Arc::new(MockLedger::new("me"));
        let handle = spawn_actor(&ledger);
        let mut events = handle.subscribe();

        assert!(!handle.is_ready());
        assert_eq!(handle.connect().await.unwrap(), AccountId::new("me"));
        assert_eq!(handle.connect().await.unwrap(), AccountId::new("me"));

        assert_eq!(events.recv().await.unwrap(), SettlementEvent::Ready { account: "me".into() });
        assert_matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty));
        assert_eq!(ledger.connect_count(), 1);
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_connect_failure_can_be_retried() {
        let ledger = Arc::new(MockLedger::new("me"));
        ledger.fail_connects(1);
        let handle = spawn_actor(&ledger);

        assert_matches!(handle.connect().await, Err(SettlementError::ConnectFailed(LedgerError::Unreachable(_))));
        assert!(!handle.is_ready());
        assert!(handle.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_payment_queued_until_ready() {
        let ledger = Arc::new(MockLedger::new("me"));
        let handle = spawn_actor(&ledger);

        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.send_payment(params("bob", "0.5")).await }
        });
        tokio::task::yield_now().await;
        assert!(ledger.payments().is_empty());

        handle.connect().await.unwrap();
        let receipt = pending.await.unwrap().unwrap();
        assert_eq!(receipt.reference, "out-1");
        assert_eq!(ledger.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_submission_failure_surfaces() {
        let ledger = Arc::new(MockLedger::new("me"));
        ledger.fail_payments(Some(LedgerError::Rejected("insufficient funds".into())));
        let handle = spawn_actor(&ledger);
        handle.connect().await.unwrap();

        assert_matches!(
            handle.send_payment(params("bob", "0.5")).await,
            Err(SettlementError::Submission(LedgerError::Rejected(_)))
        );
    }

    #[tokio::test]
    async fn test_normalize_uses_rate_cache() {
        let ledger = Arc::new(MockLedger::new("me"));
        ledger.set_rate(amount("2"), amount("1"));
        let handle = spawn_actor(&ledger);
        handle.connect().await.unwrap();
        let bob = AccountId::new("bob");

        assert_eq!(handle.normalize_amount(&bob, amount("1")).await.unwrap(), amount("2"));
        assert_eq!(ledger.quote_count(), 1);

        assert_eq!(handle.normalize_amount(&bob, amount("1.005")).await.unwrap(), amount("2.01"));
        assert_eq!(ledger.quote_count(), 1);

        assert_eq!(handle.normalize_amount(&bob, amount("3")).await.unwrap(), amount("6"));
        assert_eq!(ledger.quote_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_rate_expires() {
        let ledger = Arc::new(MockLedger::new("me"));
        let handle = spawn_actor(&ledger);
        handle.connect().await.unwrap();
        let bob = AccountId::new("bob");

        handle.normalize_amount(&bob, amount("1")).await.unwrap();
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        handle.normalize_amount(&bob, amount("1")).await.unwrap();

        assert_eq!(ledger.quote_count(), 2);
    }

    #[tokio::test]
    async fn test_normalization_failure() {
        let ledger = Arc::new(MockLedger::new("me"));
        ledger.fail_quotes(Some(LedgerError::NoRoute { destination: "bob".into() }));
        let handle = spawn_actor(&ledger);
        handle.connect().await.unwrap();

        assert_matches!(
            handle.normalize_amount(&"bob".into(), amount("1")).await,
            Err(SettlementError::Normalization(LedgerError::NoRoute { .. }))
        );
    }

    #[tokio::test]
    async fn test_notifications_classified() {
        let ledger = Arc::new(MockLedger::new("me"));
        let handle = spawn_actor(&ledger);
        let mut events = handle.subscribe();
        handle.connect().await.unwrap();
        assert_matches!(events.recv().await.unwrap(), SettlementEvent::Ready { .. });

        let payer = test_peer(9);
        ledger.notify_incoming("alice", amount("0.5"), None);
        ledger.notify_incoming("alice", amount("0.5"), Some(Memo::Text("not json".into())));
        ledger.notify_incoming("alice", amount("0.5"), Some(Memo::tag(&payer)));
        ledger.notify(tollgate_api::LedgerNotification {
            reference: "x".into(),
            source_account: "me".into(),
            destination_account: "bob".into(),
            amount: amount("0.25"),
            memo: Some(Memo::tag(&test_peer(0))),
        });

        assert_matches!(
            events.recv().await.unwrap(),
            SettlementEvent::Incoming { peer, amount: credited, .. } if peer == payer && credited == amount("0.5")
        );
        assert_matches!(
            events.recv().await.unwrap(),
            SettlementEvent::Outgoing { destination, .. } if destination == AccountId::new("bob")
        );
    }
}

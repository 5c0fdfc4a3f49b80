#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tollgate_api::{Memo, WireEvent};
use tollgate_engine::{EngineEvent, PaymentEngine};
use tollgate_policy::PaymentArgs;
use tollgate_primitives::{AccountId, Amount, PeerIdentity};
use tollgate_test_utils::{
    MockLedger, MockTransfer, MockWire, amount, init_test_tracing, test_info_hash, test_peer,
};

/// Length of the harness transfer.
pub const TRANSFER_LENGTH: u64 = 1_000_000;

/// 0.0001 per byte, starting bid 0.01.
pub fn config() -> PaymentArgs {
    PaymentArgs { price: amount("0.0001"), ..Default::default() }
}

pub fn local() -> PeerIdentity {
    test_peer(0)
}

pub struct Harness {
    pub engine: PaymentEngine,
    pub ledger: Arc<MockLedger>,
    pub transfer: Arc<MockTransfer>,
}

impl Harness {
    /// Engine with a connected ledger and one attached transfer.
    pub async fn new() -> Self {
        init_test_tracing();
        let ledger = Arc::new(MockLedger::new("local"));
        let engine = PaymentEngine::with_ledger(local(), Arc::clone(&ledger), &config());
        engine.ready().await.unwrap();

        let transfer = MockTransfer::new(test_info_hash(1), TRANSFER_LENGTH);
        assert!(engine.attach(Arc::clone(&transfer)));
        Self { engine, ledger, transfer }
    }

    /// Open a connection to `peer` and complete its payment handshake.
    pub async fn connect(&self, peer: PeerIdentity) -> (Arc<MockWire>, mpsc::UnboundedSender<WireEvent>) {
        let before = self.engine.num_connections();
        let (wire, attachment, tx) = MockWire::attach();
        self.transfer.open_wire(attachment);
        tx.send(WireEvent::Handshake { peer, account: account_of(&peer) }).unwrap();
        eventually("handshake", || self.engine.num_connections() == before + 1).await;
        (wire, tx)
    }

    /// Have `peer` pay us through the ledger and wait for the credit.
    pub async fn pay_us(&self, peer: PeerIdentity, paid: Amount) {
        let expected = self.engine.balance_of(&peer) + paid;
        self.ledger.notify_incoming(account_of(&peer).as_str(), paid, Some(Memo::tag(&peer)));
        eventually("credit", || self.engine.balance_of(&peer) == expected).await;
    }
}

pub fn account_of(peer: &PeerIdentity) -> AccountId {
    AccountId::new(format!("acct-{}", peer.short()))
}

/// Yield to spawned tasks until `done` holds.
pub async fn eventually(what: &str, done: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {what}");
}

/// Yield to spawned tasks for a while.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Receive events until `select` picks one.
pub async fn wait_for<T>(
    events: &mut broadcast::Receiver<EngineEvent>,
    mut select: impl FnMut(EngineEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = events.recv().await.expect("engine events closed");
            if let Some(selected) = select(event) {
                return selected;
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

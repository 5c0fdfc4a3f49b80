//! The payment engine: wires transfer events to the payment policy.

use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tollgate_accounting::{Accounting, Filter, TorrentEconomicsSnapshot};
use tollgate_api::{
    LedgerClient, PaymentConfig, Transfer, TransferEvent, Wire, WireAttachment, WireEvent,
};
use tollgate_policy::{
    BidController, ChargeContext, ChargeDecision, PaymentDecider, PaymentOutcome, PaymentRequest,
    RequestCharger,
};
use tollgate_primitives::{AccountId, Amount, ConnectionId, InfoHash, PeerIdentity};
use tollgate_settlement::{
    SettlementError, SettlementEvent, SettlementHandle, create_settlement_actor,
};
use tracing::{debug, info, trace, warn};

use crate::{
    EngineEvent,
    connection::{Connection, ConnectionRegistry},
    metrics::PaymentMetrics,
};

/// Capacity of the engine event channel.
pub const ENGINE_EVENT_CAPACITY: usize = 256;

/// Payment-gated flow control for every attached transfer.
///
/// Cheap to clone; all clones share the same balances, connections and
/// event stream. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct PaymentEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    local: PeerIdentity,
    accounting: Arc<Accounting>,
    charger: RequestCharger,
    bids: BidController,
    decider: PaymentDecider<SettlementHandle>,
    settlement: SettlementHandle,
    connections: ConnectionRegistry,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: PaymentMetrics,
}

impl PaymentEngine {
    /// Create an engine over an existing settlement actor and start
    /// listening for its events.
    pub fn new(
        local: PeerIdentity,
        settlement: SettlementHandle,
        config: &impl PaymentConfig,
    ) -> Self {
        // History must cover the rate-limit window.
        let accounting = Arc::new(Accounting::new(config.payment_window()));
        let (events_tx, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);

        let inner = Arc::new(EngineInner {
            local,
            charger: RequestCharger::from_config(config),
            bids: BidController::from_config(config),
            decider: PaymentDecider::new(
                Arc::clone(&accounting),
                settlement.clone(),
                local,
                config,
            ),
            accounting,
            settlement: settlement.clone(),
            connections: ConnectionRegistry::default(),
            events_tx,
            metrics: PaymentMetrics::default(),
        });

        // Subscribe before spawning so the ready event cannot be missed.
        let settlement_events = settlement.subscribe();
        tokio::spawn(EngineInner::run_settlement_events(Arc::downgrade(&inner), settlement_events));

        Self { inner }
    }

    /// Create an engine with its own settlement actor over `ledger` and
    /// start connecting.
    ///
    /// A failed connect is logged; call [`connect`](Self::connect) to retry.
    pub fn with_ledger<L: LedgerClient>(
        local: PeerIdentity,
        ledger: Arc<L>,
        config: &impl PaymentConfig,
    ) -> Self {
        let (service, settlement) = create_settlement_actor(ledger, config);
        tokio::spawn(service.run());

        let engine = Self::new(local, settlement, config);
        let connecting = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = connecting.connect().await {
                warn!(error = %e, "Settlement connect failed");
            }
        });
        engine
    }

    /// Connect the settlement client; a no-op once connected.
    pub async fn connect(&self) -> Result<AccountId, SettlementError> {
        self.inner.settlement.connect().await
    }

    /// Our own identity.
    pub fn local(&self) -> PeerIdentity {
        self.inner.local
    }

    /// Whether the settlement client is connected.
    pub fn is_ready(&self) -> bool {
        self.inner.settlement.is_ready()
    }

    /// Wait until the settlement client is connected.
    pub async fn ready(&self) -> Result<AccountId, SettlementError> {
        self.inner.settlement.ready().await
    }

    pub fn settlement(&self) -> &SettlementHandle {
        &self.inner.settlement
    }

    pub fn accounting(&self) -> &Arc<Accounting> {
        &self.inner.accounting
    }

    /// Subscribe to engine events. Events published before subscribing are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Attach payment handling to a transfer.
    ///
    /// Returns `false` if the transfer's events were already taken, in which
    /// case nothing is attached. Connections are handled only once the
    /// settlement client is ready.
    pub fn attach<T: Transfer + 'static>(&self, transfer: Arc<T>) -> bool {
        let Some(events) = transfer.take_events() else {
            debug!(info_hash = %transfer.info_hash(), "Transfer already attached");
            return false;
        };

        let info_hash = transfer.info_hash();
        self.inner.accounting.open_torrent(info_hash);
        tokio::spawn(Arc::clone(&self.inner).run_transfer(
            info_hash,
            Arc::downgrade(&transfer),
            events,
        ));
        true
    }

    /// Current balance of `peer`.
    pub fn balance_of(&self, peer: &PeerIdentity) -> Amount {
        self.inner.accounting.balance_of(peer)
    }

    /// Every known peer balance.
    pub fn balances(&self) -> Vec<(PeerIdentity, Amount)> {
        self.inner.accounting.balances()
    }

    /// Earned/spent totals of a transfer.
    pub fn torrent_economics(&self, info_hash: &InfoHash) -> Option<TorrentEconomicsSnapshot> {
        self.inner.accounting.torrent(info_hash).map(|torrent| torrent.snapshot())
    }

    /// Total amount sent to peers matching `filter`.
    pub fn total_sent(&self, filter: Filter) -> Amount {
        self.inner.accounting.tracker().total_sent(filter)
    }

    /// Delivery speed in bytes per second of peers matching `filter`.
    pub fn delivery_speed(&self, filter: Filter, include_time_to_now: bool) -> f64 {
        self.inner.accounting.tracker().delivery_speed(filter, include_time_to_now, Instant::now())
    }

    /// Bids of `peer`'s handshaken connections.
    pub fn connection_bids(&self, peer: &PeerIdentity) -> Vec<(ConnectionId, Amount)> {
        self.inner.connections.bids_of(peer)
    }

    /// Number of handshaken connections.
    pub fn num_connections(&self) -> usize {
        self.inner.connections.len()
    }

    /// Discard a transfer's economics and history.
    pub fn forget_torrent(&self, info_hash: &InfoHash) {
        self.inner.accounting.forget_torrent(info_hash);
    }

    /// Discard a peer's balance and history.
    ///
    /// Refused (returns `false`) while the peer still has connections.
    pub fn forget_peer(&self, peer: &PeerIdentity) -> bool {
        let accounting = &self.inner.accounting;
        self.inner.connections.forget_if_idle(peer, || accounting.forget_peer(peer))
    }
}

impl std::fmt::Debug for PaymentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentEngine")
            .field("local", &self.inner.local.short())
            .field("ready", &self.inner.settlement.is_ready())
            .field("connections", &self.inner.connections.len())
            .field("accounting", &self.inner.accounting)
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    /// Holds the engine weakly: the listener ends once the engine is dropped
    /// and the settlement service has stopped.
    async fn run_settlement_events(
        engine: Weak<Self>,
        mut events: broadcast::Receiver<SettlementEvent>,
    ) {
        loop {
            let event = events.recv().await;
            let Some(inner) = engine.upgrade() else {
                break;
            };
            match event {
                Ok(SettlementEvent::Ready { account }) => {
                    info!(%account, "Wallet ready");
                    inner.emit(EngineEvent::WalletReady { account });
                }
                Ok(SettlementEvent::Incoming { peer, amount, reference }) => {
                    trace!(%reference, "Incoming settlement");
                    inner.on_incoming_payment(peer, amount);
                }
                Ok(SettlementEvent::Outgoing { destination, amount, reference }) => {
                    trace!(%destination, %amount, %reference, "Outgoing settlement");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Settlement events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Settlement events closed");
                    break;
                }
            }
        }
    }

    /// Credit a settlement, then unchoke and raise the bid of every
    /// connection to the payer.
    fn on_incoming_payment(&self, peer: PeerIdentity, amount: Amount) {
        let balance = self.accounting.credit(peer, amount);
        self.metrics.incoming_credits_total.increment(1);

        let connections = self.connections.of(&peer);
        for connection in &connections {
            connection.wire.unchoke();
            self.bids.on_payment_accepted(&connection.bid);
        }

        info!(
            peer = %peer.short(),
            %amount,
            %balance,
            connections = connections.len(),
            "Credited incoming payment"
        );
        self.emit(EngineEvent::IncomingPayment { peer, amount, balance });
    }

    /// Holds the transfer weakly. Its economics are discarded once its event
    /// stream closes.
    async fn run_transfer<T: Transfer + 'static>(
        self: Arc<Self>,
        info_hash: InfoHash,
        transfer: Weak<T>,
        mut events: mpsc::UnboundedReceiver<TransferEvent>,
    ) {
        if let Err(e) = self.settlement.ready().await {
            warn!(%info_hash, error = %e, "Settlement unavailable, not handling transfer");
            return;
        }
        debug!(%info_hash, "Handling transfer");

        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Wire(attachment) => {
                    tokio::spawn(Arc::clone(&self).run_wire(
                        info_hash,
                        Weak::clone(&transfer),
                        attachment,
                    ));
                }
                TransferEvent::Done => {
                    let torrent = self.accounting.open_torrent(info_hash);
                    let total_spent = torrent.total_spent();
                    let total_earned = torrent.total_earned();
                    info!(%info_hash, %total_spent, %total_earned, "Transfer done");
                    self.emit(EngineEvent::TransferDone { info_hash, total_spent, total_earned });
                }
                TransferEvent::Error(reason) => {
                    warn!(%info_hash, %reason, "Transfer error");
                    self.emit(EngineEvent::TransferFailed { info_hash, reason });
                }
            }
        }
        self.accounting.forget_torrent(&info_hash);
        debug!(%info_hash, "Transfer events closed, economics discarded");
    }

    async fn run_wire<T: Transfer + 'static>(
        self: Arc<Self>,
        info_hash: InfoHash,
        transfer: Weak<T>,
        attachment: WireAttachment,
    ) {
        let WireAttachment { wire, mut events } = attachment;

        // Nothing is served before the peer has paid.
        wire.force_choke();

        let mut connection: Option<Arc<Connection>> = None;
        while let Some(event) = events.recv().await {
            if let WireEvent::Handshake { peer, account } = event {
                if connection.is_some() {
                    warn!(id = %wire.id(), peer = %peer.short(), "Ignoring repeated handshake");
                } else {
                    connection = Some(self.register(&wire, peer, account, info_hash));
                }
                continue;
            }

            let Some(current) = connection.as_ref() else {
                debug!(id = %wire.id(), ?event, "Ignoring event before handshake");
                continue;
            };
            match event {
                WireEvent::Request { bytes } => self.on_request(current, bytes),
                WireEvent::PaymentRequest { amount } => {
                    let Some(transfer) = transfer.upgrade() else {
                        debug!(id = %wire.id(), %info_hash, "Transfer gone, ignoring payment request");
                        continue;
                    };
                    self.on_payment_request(current, transfer.remaining(), amount);
                }
                WireEvent::PaymentRequestTooHigh { amount } => {
                    let bid = self.bids.on_too_high(&current.bid);
                    debug!(
                        id = %wire.id(),
                        refused = ?amount,
                        %bid,
                        "Peer called our payment request too high"
                    );
                }
                WireEvent::Download { bytes } => {
                    self.accounting.record_delivery(current.peer, info_hash, bytes, Instant::now());
                }
                WireEvent::Warning(message) => {
                    debug!(id = %wire.id(), %message, "Wire warning");
                }
                WireEvent::Handshake { .. } => {}
            }
        }

        if let Some(connection) = connection {
            if self.connections.remove(&connection.peer, connection.id()) {
                self.metrics.connections.decrement(1.0);
            }
            debug!(id = %connection.id(), peer = %connection.peer.short(), "Connection closed");
        }
    }

    fn register(
        &self,
        wire: &Arc<dyn Wire>,
        peer: PeerIdentity,
        account: AccountId,
        info_hash: InfoHash,
    ) -> Arc<Connection> {
        debug!(id = %wire.id(), peer = %peer.short(), %account, "Payment handshake");
        let connection = self.connections.register_with(peer, || {
            Arc::new(Connection {
                wire: Arc::clone(wire),
                peer,
                account,
                info_hash,
                balance: self.accounting.get_or_create_peer(peer),
                bid: self.bids.open(),
            })
        });
        self.metrics.connections.increment(1.0);
        connection
    }

    fn on_request(&self, connection: &Connection, bytes: u64) {
        let torrent = self.accounting.open_torrent(connection.info_hash);
        let ctx = ChargeContext {
            wire: connection.wire.as_ref(),
            balance: &connection.balance,
            bid: &connection.bid,
            torrent: &torrent,
        };

        match self.charger.handle_request(ctx, bytes) {
            ChargeDecision::Served { .. } => self.metrics.charges_total.increment(1),
            ChargeDecision::PaymentRequested { required, requested, balance } => {
                self.metrics.insufficient_balance_total.increment(1);
                debug!(
                    id = %connection.id(),
                    peer = %connection.peer.short(),
                    %required,
                    %requested,
                    %balance,
                    "Balance too low, requested payment"
                );
            }
        }
    }

    fn on_payment_request(self: &Arc<Self>, connection: &Arc<Connection>, remaining: u64, amount: Amount) {
        let request = PaymentRequest {
            peer: connection.peer,
            destination: connection.account.clone(),
            torrent: connection.info_hash,
            destination_amount: amount,
            bytes_remaining: remaining,
        };

        // Submission waits on the ledger; keep the wire responsive.
        let inner = Arc::clone(self);
        let connection = Arc::clone(connection);
        tokio::spawn(async move {
            let outcome = inner.decider.handle_payment_request(request).await;
            inner.on_payment_outcome(&connection, outcome);
        });
    }

    fn on_payment_outcome(&self, connection: &Connection, outcome: PaymentOutcome) {
        match outcome {
            PaymentOutcome::Paid { id, amount, .. } => {
                self.metrics.payments_sent_total.increment(1);
                self.emit(EngineEvent::OutgoingPayment {
                    id,
                    peer: connection.peer,
                    info_hash: connection.info_hash,
                    amount,
                });
            }
            PaymentOutcome::Refused(reason) => {
                self.metrics.payments_refused_total.increment(1);
                debug!(id = %connection.id(), %reason, "Refused payment request");
                connection.wire.send_payment_request_too_high();
            }
            PaymentOutcome::Abandoned(_) => self.metrics.payments_abandoned_total.increment(1),
            PaymentOutcome::Failed { .. } => self.metrics.payments_failed_total.increment(1),
            PaymentOutcome::InFlight => self.metrics.payments_skipped_total.increment(1),
        }
    }
}

//! Settlement service actor (runs in its own tokio task).

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tollgate_api::{LedgerClient, LedgerNotification, PaymentParams, PaymentReceipt, SettlementError};
use tollgate_primitives::{AccountId, Amount};
use tracing::{debug, info, trace, warn};

use crate::SettlementEvent;
use crate::memo::tagged_peer;
use crate::metrics::SettlementMetrics;
use crate::rates::{Quote, RateCache};

type Response<T> = oneshot::Sender<Result<T, SettlementError>>;

/// Commands from the handle to the service.
pub enum SettlementCommand {
    /// Connect the ledger client.
    Connect {
        /// Channel to send the result.
        response_tx: Response<AccountId>,
    },
    /// Convert a destination amount into our unit.
    Normalize {
        destination: AccountId,
        destination_amount: Amount,
        /// Channel to send the result.
        response_tx: Response<Amount>,
    },
    /// Submit a payment.
    SendPayment {
        params: PaymentParams,
        /// Channel to send the result.
        response_tx: Response<PaymentReceipt>,
    },
}

/// Owns the ledger client, its notification feed and the rate cache.
pub struct SettlementService<L> {
    ledger: Arc<L>,
    /// Receive commands from handles.
    command_rx: mpsc::UnboundedReceiver<SettlementCommand>,
    /// Quotes completed by spawned lookups, to be cached.
    quote_tx: mpsc::UnboundedSender<(AccountId, Quote)>,
    quote_rx: mpsc::UnboundedReceiver<(AccountId, Quote)>,
    /// Ledger notifications, available once connected.
    notifications: Option<mpsc::UnboundedReceiver<LedgerNotification>>,
    /// Our account once connected.
    ready_tx: watch::Sender<Option<AccountId>>,
    events_tx: broadcast::Sender<SettlementEvent>,
    rates: RateCache,
    metrics: SettlementMetrics,
}

impl<L: LedgerClient> SettlementService<L> {
    pub(crate) fn new(
        ledger: Arc<L>,
        command_rx: mpsc::UnboundedReceiver<SettlementCommand>,
        ready_tx: watch::Sender<Option<AccountId>>,
        events_tx: broadcast::Sender<SettlementEvent>,
        rates: RateCache,
    ) -> Self {
        let (quote_tx, quote_rx) = mpsc::unbounded_channel();
        Self {
            ledger,
            command_rx,
            quote_tx,
            quote_rx,
            notifications: None,
            ready_tx,
            events_tx,
            rates,
            metrics: SettlementMetrics::default(),
        }
    }

    /// Run the service event loop.
    ///
    /// This method runs until all handles are dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // Quotes are cached before later commands are served.
                biased;

                Some((destination, quote)) = self.quote_rx.recv() => {
                    self.rates.insert(destination, quote);
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Settlement service shutting down");
                        break;
                    }
                },
                notification = next_notification(&mut self.notifications) => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => {
                        warn!("Ledger notification feed closed");
                        self.notifications = None;
                    }
                },
            }
        }

        let connected = self.ready_tx.borrow().is_some();
        if connected {
            self.ledger.disconnect().await;
        }
    }

    /// Convert self into a spawnable future.
    pub async fn into_task(self) {
        self.run().await;
    }

    async fn handle_command(&mut self, command: SettlementCommand) {
        match command {
            SettlementCommand::Connect { response_tx } => {
                let _ = response_tx.send(self.connect().await);
            }
            SettlementCommand::Normalize { destination, destination_amount, response_tx } => {
                self.normalize(destination, destination_amount, response_tx);
            }
            SettlementCommand::SendPayment { params, response_tx } => {
                self.send_payment(params, response_tx);
            }
        }
    }

    async fn connect(&mut self) -> Result<AccountId, SettlementError> {
        let current = self.ready_tx.borrow().clone();
        if let Some(account) = current {
            return Ok(account);
        }

        let account = self.ledger.connect().await.map_err(|e| {
            warn!(error = %e, "Failed to connect settlement ledger");
            SettlementError::ConnectFailed(e)
        })?;

        self.notifications = self.ledger.take_notifications();
        if self.notifications.is_none() {
            warn!("Ledger notification feed already taken, incoming payments will be missed");
        }
        self.ready_tx.send_replace(Some(account.clone()));
        info!(%account, "Settlement ledger ready");
        let _ = self.events_tx.send(SettlementEvent::Ready { account: account.clone() });
        Ok(account)
    }

    fn normalize(&mut self, destination: AccountId, destination_amount: Amount, response_tx: Response<Amount>) {
        if let Some(source_amount) = self.rates.lookup(&destination, destination_amount, Instant::now()) {
            self.metrics.rate_cache_hits_total.increment(1);
            trace!(%destination, %destination_amount, %source_amount, "Normalized from cached rate");
            let _ = response_tx.send(Ok(source_amount));
            return;
        }
        self.metrics.rate_cache_misses_total.increment(1);

        let ledger = Arc::clone(&self.ledger);
        let quote_tx = self.quote_tx.clone();
        let quote_failures = self.metrics.quote_failures_total.clone();
        tokio::spawn(async move {
            match ledger.quote_source_amount(&destination, destination_amount).await {
                Ok(source_amount) => {
                    debug!(%destination, %destination_amount, %source_amount, "Quoted source amount");
                    let quote = Quote { destination_amount, source_amount, quoted_at: Instant::now() };
                    let _ = quote_tx.send((destination, quote));
                    let _ = response_tx.send(Ok(source_amount));
                }
                Err(e) => {
                    quote_failures.increment(1);
                    let _ = response_tx.send(Err(SettlementError::Normalization(e)));
                }
            }
        });
    }

    fn send_payment(&self, params: PaymentParams, response_tx: Response<PaymentReceipt>) {
        let ledger = Arc::clone(&self.ledger);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let destination = params.destination_account.clone();
            let amount = params.source_amount;
            let result = ledger.send_payment(params).await;
            match &result {
                Ok(receipt) => {
                    metrics.payments_accepted_total.increment(1);
                    debug!(%destination, %amount, reference = %receipt.reference, "Ledger accepted payment");
                }
                Err(e) => {
                    metrics.payments_rejected_total.increment(1);
                    debug!(%destination, %amount, error = %e, "Ledger rejected payment");
                }
            }
            let _ = response_tx.send(result.map_err(SettlementError::Submission));
        });
    }

    fn handle_notification(&self, notification: LedgerNotification) {
        let Some(account) = self.ready_tx.borrow().clone() else {
            return;
        };
        let LedgerNotification { reference, source_account, destination_account, amount, memo } = notification;

        if destination_account == account {
            let Some(peer) = tagged_peer(memo.as_ref()) else {
                self.metrics.malformed_notifications_total.increment(1);
                warn!(%reference, from = %source_account, %amount, "Ignoring incoming settlement without a peer tag");
                return;
            };
            self.metrics.incoming_total.increment(1);
            debug!(%reference, peer = %peer.short(), %amount, "Incoming settlement");
            let _ = self.events_tx.send(SettlementEvent::Incoming { peer, amount, reference });
        } else if source_account == account {
            self.metrics.outgoing_total.increment(1);
            debug!(%reference, to = %destination_account, %amount, "Outgoing settlement");
            let _ = self.events_tx.send(SettlementEvent::Outgoing {
                destination: destination_account,
                amount,
                reference,
            });
        } else {
            trace!(%reference, "Ignoring unrelated settlement");
        }
    }
}

/// Next ledger notification, or never if not connected.
async fn next_notification(
    notifications: &mut Option<mpsc::UnboundedReceiver<LedgerNotification>>,
) -> Option<LedgerNotification> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

//! Cloneable handle for interacting with the settlement service.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tollgate_api::{PaymentParams, PaymentReceipt, Settlement, SettlementError};
use tollgate_primitives::{AccountId, Amount};

use crate::SettlementEvent;
use crate::service::SettlementCommand;

/// Cloneable handle for normalizing amounts and sending payments.
///
/// Operations issued before the ledger is ready wait for readiness; wrap
/// them in a timeout to give up early.
#[derive(Clone)]
pub struct SettlementHandle {
    command_tx: mpsc::UnboundedSender<SettlementCommand>,
    ready_rx: watch::Receiver<Option<AccountId>>,
    events_tx: broadcast::Sender<SettlementEvent>,
}

impl SettlementHandle {
    pub(crate) fn new(
        command_tx: mpsc::UnboundedSender<SettlementCommand>,
        ready_rx: watch::Receiver<Option<AccountId>>,
        events_tx: broadcast::Sender<SettlementEvent>,
    ) -> Self {
        Self { command_tx, ready_rx, events_tx }
    }

    /// Connect the ledger client. Resolves to our account.
    ///
    /// Connecting an already connected client returns its account without
    /// reconnecting. A failed attempt may be retried.
    pub async fn connect(&self) -> Result<AccountId, SettlementError> {
        self.request(|response_tx| SettlementCommand::Connect { response_tx }).await
    }

    /// Our account, if connected.
    pub fn account(&self) -> Option<AccountId> {
        self.ready_rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready_rx.borrow().is_some()
    }

    /// Wait until the ledger client is connected.
    pub async fn ready(&self) -> Result<AccountId, SettlementError> {
        let mut ready_rx = self.ready_rx.clone();
        let account = ready_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SettlementError::ServiceStopped)?
            .clone();
        account.ok_or(SettlementError::NotReady)
    }

    /// Subscribe to settlement events.
    ///
    /// Events published before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.events_tx.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, SettlementError>>) -> SettlementCommand,
    ) -> Result<T, SettlementError> {
        let (tx, rx) = oneshot::channel();

        self.command_tx
            .send(command(tx))
            .map_err(|_| SettlementError::ServiceStopped)?;

        rx.await.map_err(|_| SettlementError::ServiceStopped)?
    }
}

#[async_trait::async_trait]
impl Settlement for SettlementHandle {
    async fn normalize_amount(
        &self,
        destination: &AccountId,
        destination_amount: Amount,
    ) -> Result<Amount, SettlementError> {
        self.ready().await?;
        let destination = destination.clone();
        self.request(|response_tx| SettlementCommand::Normalize {
            destination,
            destination_amount,
            response_tx,
        })
        .await
    }

    async fn send_payment(&self, params: PaymentParams) -> Result<PaymentReceipt, SettlementError> {
        self.ready().await?;
        self.request(|response_tx| SettlementCommand::SendPayment { params, response_tx }).await
    }
}

impl std::fmt::Debug for SettlementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementHandle")
            .field("account", &*self.ready_rx.borrow())
            .finish_non_exhaustive()
    }
}

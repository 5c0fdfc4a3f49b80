//! Scriptable in-memory settlement ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tollgate_api::{
    LedgerClient, LedgerError, LedgerNotification, Memo, PaymentParams, PaymentReceipt,
};
use tollgate_primitives::{AccountId, Amount};

/// Exchange rate applied by [`MockLedger::quote_source_amount`]:
/// `source = destination × source_units / destination_units`.
#[derive(Debug, Clone, Copy)]
struct Rate {
    source_units: Amount,
    destination_units: Amount,
}

/// In-memory [`LedgerClient`].
///
/// Quotes at a configurable rate (1:1 by default), records submitted
/// payments, and lets tests push settlement notifications.
#[derive(Debug)]
pub struct MockLedger {
    account: AccountId,
    rate: Mutex<Rate>,
    connect_failures: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    quote_error: Mutex<Option<LedgerError>>,
    payment_error: Mutex<Option<LedgerError>>,
    payments_paused: watch::Sender<bool>,
    connects: AtomicUsize,
    quotes: AtomicUsize,
    payments: Mutex<Vec<PaymentParams>>,
    notifications_tx: mpsc::UnboundedSender<LedgerNotification>,
    notifications_rx: Mutex<Option<mpsc::UnboundedReceiver<LedgerNotification>>>,
}

impl MockLedger {
    pub fn new(account: impl Into<String>) -> Self {
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        Self {
            account: AccountId::new(account),
            rate: Mutex::new(Rate { source_units: Amount::from_whole(1), destination_units: Amount::from_whole(1) }),
            connect_failures: AtomicUsize::new(0),
            connect_delay: Mutex::new(None),
            quote_error: Mutex::new(None),
            payment_error: Mutex::new(None),
            payments_paused: watch::Sender::new(false),
            connects: AtomicUsize::new(0),
            quotes: AtomicUsize::new(0),
            payments: Mutex::new(Vec::new()),
            notifications_tx,
            notifications_rx: Mutex::new(Some(notifications_rx)),
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Quote `source_units` of ours for every `destination_units` requested.
    pub fn set_rate(&self, source_units: Amount, destination_units: Amount) {
        *self.rate.lock() = Rate { source_units, destination_units };
    }

    /// Fail the next `times` connect attempts.
    pub fn fail_connects(&self, times: usize) {
        self.connect_failures.store(times, Ordering::SeqCst);
    }

    /// Delay every connect by `delay`.
    pub fn delay_connect(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Fail quotes with `error` until cleared with `None`.
    pub fn fail_quotes(&self, error: Option<LedgerError>) {
        *self.quote_error.lock() = error;
    }

    /// Reject payments with `error` until cleared with `None`.
    pub fn fail_payments(&self, error: Option<LedgerError>) {
        *self.payment_error.lock() = error;
    }

    /// Hold submitted payments until [`resume_payments`](Self::resume_payments).
    pub fn pause_payments(&self) {
        self.payments_paused.send_replace(true);
    }

    pub fn resume_payments(&self) {
        self.payments_paused.send_replace(false);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn quote_count(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }

    /// Payments accepted or attempted, in submission order.
    pub fn payments(&self) -> Vec<PaymentParams> {
        self.payments.lock().clone()
    }

    /// Push a raw settlement notification.
    pub fn notify(&self, notification: LedgerNotification) {
        let _ = self.notifications_tx.send(notification);
    }

    /// Push a settlement crediting our account, paid from `from`.
    pub fn notify_incoming(&self, from: &str, amount: Amount, memo: Option<Memo>) {
        self.notify(LedgerNotification {
            reference: format!("in-{}", self.payments.lock().len()),
            source_account: AccountId::new(from),
            destination_account: self.account.clone(),
            amount,
            memo,
        });
    }
}

#[async_trait::async_trait]
impl LedgerClient for MockLedger {
    async fn connect(&self) -> Result<AccountId, LedgerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(LedgerError::Unreachable("mock connect failure".into()));
        }
        Ok(self.account.clone())
    }

    async fn quote_source_amount(
        &self,
        destination: &AccountId,
        destination_amount: Amount,
    ) -> Result<Amount, LedgerError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.quote_error.lock().clone() {
            return Err(error);
        }
        let rate = *self.rate.lock();
        destination_amount
            .checked_mul_div(rate.source_units, rate.destination_units)
            .ok_or_else(|| LedgerError::NoRoute { destination: destination.to_string() })
    }

    async fn send_payment(&self, params: PaymentParams) -> Result<PaymentReceipt, LedgerError> {
        let mut paused = self.payments_paused.subscribe();
        let _ = paused.wait_for(|paused| !paused).await;

        let reference = {
            let mut payments = self.payments.lock();
            payments.push(params);
            format!("out-{}", payments.len())
        };
        if let Some(error) = self.payment_error.lock().clone() {
            return Err(error);
        }
        Ok(PaymentReceipt { reference })
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<LedgerNotification>> {
        self.notifications_rx.lock().take()
    }
}

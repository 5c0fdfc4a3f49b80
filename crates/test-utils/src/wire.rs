//! Recording connection mock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tollgate_api::{Wire, WireAttachment, WireEvent};
use tollgate_primitives::{Amount, ConnectionId};

/// Outbound call observed on a [`MockWire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCall {
    Unchoke,
    ForceChoke,
    LowBalance(Amount),
    PaymentRequest(Amount),
    PaymentRequestTooHigh,
}

/// Connection that records outbound calls and tracks choke state.
///
/// Starts choked, like a freshly opened peer connection.
#[derive(Debug)]
pub struct MockWire {
    id: ConnectionId,
    choked: AtomicBool,
    calls: Mutex<Vec<WireCall>>,
}

impl MockWire {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            choked: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A wire plus the attachment handed to the engine and the sender that
    /// feeds its inbound events.
    pub fn attach() -> (Arc<Self>, WireAttachment, mpsc::UnboundedSender<WireEvent>) {
        let wire = Self::new();
        let (tx, events) = mpsc::unbounded_channel();
        let attachment = WireAttachment { wire: wire.clone(), events };
        (wire, attachment, tx)
    }

    pub fn is_choked(&self) -> bool {
        self.choked.load(Ordering::SeqCst)
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<WireCall> {
        self.calls.lock().clone()
    }

    /// Drain the recorded calls.
    pub fn take_calls(&self) -> Vec<WireCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Amounts of every payment request sent.
    pub fn payment_requests(&self) -> Vec<Amount> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                WireCall::PaymentRequest(amount) => Some(*amount),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &WireCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: WireCall) {
        self.calls.lock().push(call);
    }
}

impl Wire for MockWire {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn unchoke(&self) {
        self.choked.store(false, Ordering::SeqCst);
        self.record(WireCall::Unchoke);
    }

    fn force_choke(&self) {
        self.choked.store(true, Ordering::SeqCst);
        self.record(WireCall::ForceChoke);
    }

    fn send_low_balance(&self, balance: Amount) {
        self.record(WireCall::LowBalance(balance));
    }

    fn send_payment_request(&self, amount: Amount) {
        self.record(WireCall::PaymentRequest(amount));
    }

    fn send_payment_request_too_high(&self) {
        self.record(WireCall::PaymentRequestTooHigh);
    }
}

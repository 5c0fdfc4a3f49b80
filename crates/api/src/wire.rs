//! Connection (wire) abstraction for the payment protocol extension.
//!
//! Inbound protocol events arrive as typed [`WireEvent`] messages; outbound
//! protocol actions are explicit calls on a [`Wire`].

use tokio::sync::mpsc;
use tollgate_primitives::{AccountId, Amount, ConnectionId, PeerIdentity};

/// One transport-level link to a remote peer.
///
/// Outbound calls queue a message on the connection and MUST NOT block.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Wire: Send + Sync {
    /// Identifier of this connection.
    fn id(&self) -> ConnectionId;

    /// Allow the remote peer to request data.
    fn unchoke(&self);

    /// Stop serving the remote peer regardless of its request state.
    fn force_choke(&self);

    /// Tell the remote peer its balance is running low.
    fn send_low_balance(&self, balance: Amount);

    /// Ask the remote peer to pre-pay `amount`.
    fn send_payment_request(&self, amount: Amount);

    /// Tell the remote peer its payment request was refused.
    fn send_payment_request_too_high(&self);
}

/// Inbound event on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// Extension handshake completed; the peer presented its identity.
    Handshake {
        /// The peer's stable public key.
        peer: PeerIdentity,
        /// Ledger account the peer wants to be paid on.
        account: AccountId,
    },

    /// The peer requested `bytes` of data from us.
    Request {
        /// Bytes requested.
        bytes: u64,
    },

    /// The peer asks us to pay before it serves more data.
    PaymentRequest {
        /// Amount in the peer's settlement unit.
        amount: Amount,
    },

    /// The peer refused a payment request we sent as too high.
    PaymentRequestTooHigh {
        /// The refused amount, if the peer reported it.
        amount: Option<Amount>,
    },

    /// Protocol-level warning from the extension.
    Warning(String),

    /// Transport delivered `bytes` of data to us on this connection.
    Download {
        /// Bytes received.
        bytes: u64,
    },
}

/// A newly opened connection together with its inbound event stream.
pub struct WireAttachment {
    /// Outbound side of the connection.
    pub wire: std::sync::Arc<dyn Wire>,
    /// Inbound events, in arrival order.
    pub events: mpsc::UnboundedReceiver<WireEvent>,
}

impl std::fmt::Debug for WireAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireAttachment").field("wire", &self.wire.id()).finish_non_exhaustive()
    }
}

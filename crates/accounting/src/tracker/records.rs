//! Records kept by the delivery/spend tracker.

use tokio::time::Instant;
use tollgate_primitives::{AccountId, Amount, InfoHash, PaymentId, PeerIdentity};

/// Context of a payment request we received, logged before deciding on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestRecord {
    pub peer: PeerIdentity,
    pub torrent: InfoHash,
    /// Amount requested, in the peer's unit.
    pub destination_amount: Amount,
    /// Equivalent amount in our unit.
    pub source_amount: Amount,
    /// Bytes of the transfer still to download when the request arrived.
    pub bytes_remaining: u64,
    pub at: Instant,
}

/// A payment we are about to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub peer: PeerIdentity,
    pub torrent: InfoHash,
    pub amount: Amount,
    pub destination: AccountId,
    pub at: Instant,
}

/// Bytes received from a peer for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub peer: PeerIdentity,
    pub torrent: InfoHash,
    pub bytes: u64,
    pub at: Instant,
}

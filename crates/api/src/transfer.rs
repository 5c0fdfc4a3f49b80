//! Swarm transfer engine abstraction.
//!
//! The payment layer composes over a transfer engine rather than patching it:
//! transfers are created through [`TransferEngine`] and observed through the
//! event stream each [`Transfer`] hands out exactly once.

use std::sync::Arc;

use tokio::sync::mpsc;
use tollgate_primitives::InfoHash;

use crate::WireAttachment;

/// Event emitted by an active transfer.
#[derive(Debug)]
pub enum TransferEvent {
    /// A new peer connection was opened for this transfer.
    Wire(WireAttachment),
    /// All data has been downloaded.
    Done,
    /// The transfer failed.
    Error(String),
}

/// One active transfer (torrent).
#[auto_impl::auto_impl(&, Arc)]
pub trait Transfer: Send + Sync {
    /// Info hash identifying the transfer.
    fn info_hash(&self) -> InfoHash;

    /// Total length in bytes.
    fn length(&self) -> u64;

    /// Bytes downloaded so far.
    fn downloaded(&self) -> u64;

    /// Number of connected peers.
    fn num_peers(&self) -> usize;

    /// Current download speed in bytes per second.
    fn download_speed(&self) -> f64;

    /// Take the transfer's event stream.
    ///
    /// Returns `None` once the stream has been taken, which makes attaching
    /// handlers to a transfer idempotent.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransferEvent>>;

    /// Bytes still to download.
    fn remaining(&self) -> u64 {
        self.length().saturating_sub(self.downloaded())
    }
}

/// Engine that creates transfers.
pub trait TransferEngine: Send + Sync {
    /// Transfer handle type.
    type Transfer: Transfer + 'static;

    /// Error creating a transfer.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start seeding `source` (a local path).
    fn seed(&self, source: &str) -> Result<Arc<Self::Transfer>, Self::Error>;

    /// Start downloading `source` (a magnet URI or torrent file).
    fn download(&self, source: &str) -> Result<Arc<Self::Transfer>, Self::Error>;
}

//! Transfer engine mock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tollgate_api::{Transfer, TransferEngine, TransferEvent, WireAttachment};
use tollgate_primitives::InfoHash;

/// Transfer whose events are driven by the test.
#[derive(Debug)]
pub struct MockTransfer {
    info_hash: InfoHash,
    length: u64,
    downloaded: AtomicU64,
    peers: AtomicUsize,
    events_tx: mpsc::UnboundedSender<TransferEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransferEvent>>>,
}

impl MockTransfer {
    pub fn new(info_hash: InfoHash, length: u64) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            info_hash,
            length,
            downloaded: AtomicU64::new(0),
            peers: AtomicUsize::new(0),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Announce a new connection.
    pub fn open_wire(&self, attachment: WireAttachment) {
        self.peers.fetch_add(1, Ordering::SeqCst);
        let _ = self.events_tx.send(TransferEvent::Wire(attachment));
    }

    pub fn set_downloaded(&self, bytes: u64) {
        self.downloaded.store(bytes, Ordering::SeqCst);
    }

    /// Mark the transfer complete.
    pub fn finish(&self) {
        self.downloaded.store(self.length, Ordering::SeqCst);
        let _ = self.events_tx.send(TransferEvent::Done);
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.events_tx.send(TransferEvent::Error(reason.to_owned()));
    }
}

impl Transfer for MockTransfer {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    fn num_peers(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }

    fn download_speed(&self) -> f64 {
        0.0
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransferEvent>> {
        self.events_rx.lock().take()
    }
}

/// Error from [`MockTransferEngine`].
#[derive(Debug, thiserror::Error)]
#[error("mock transfer engine refused {0}")]
pub struct MockTransferError(pub String);

/// Engine creating [`MockTransfer`]s; the info hash is the first byte of
/// the source string repeated.
#[derive(Debug, Default)]
pub struct MockTransferEngine {
    length: u64,
    transfers: Mutex<Vec<Arc<MockTransfer>>>,
}

impl MockTransferEngine {
    pub fn new(length: u64) -> Self {
        Self { length, transfers: Mutex::new(Vec::new()) }
    }

    /// Transfers created so far.
    pub fn transfers(&self) -> Vec<Arc<MockTransfer>> {
        self.transfers.lock().clone()
    }

    fn create(&self, source: &str) -> Result<Arc<MockTransfer>, MockTransferError> {
        let Some(&first) = source.as_bytes().first() else {
            return Err(MockTransferError(source.to_owned()));
        };
        let transfer = MockTransfer::new(InfoHash::from([first; 20]), self.length);
        self.transfers.lock().push(transfer.clone());
        Ok(transfer)
    }
}

impl TransferEngine for MockTransferEngine {
    type Transfer = MockTransfer;
    type Error = MockTransferError;

    fn seed(&self, source: &str) -> Result<Arc<Self::Transfer>, Self::Error> {
        let transfer = self.create(source)?;
        transfer.set_downloaded(self.length);
        Ok(transfer)
    }

    fn download(&self, source: &str) -> Result<Arc<Self::Transfer>, Self::Error> {
        self.create(source)
    }
}

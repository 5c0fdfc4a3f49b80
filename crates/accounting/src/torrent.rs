//! Per-transfer economic state.

use std::collections::HashMap;

use parking_lot::Mutex;
use tollgate_primitives::{Amount, InfoHash, PeerIdentity};

use crate::atomic::AtomicAmount;

/// What one transfer has earned from serving and spent on downloading.
///
/// Created when a transfer begins and dropped with it.
#[derive(Debug)]
pub struct TorrentEconomics {
    info_hash: InfoHash,
    total_earned: AtomicAmount,
    total_spent: AtomicAmount,
    peers: Mutex<HashMap<PeerIdentity, PeerEconomics>>,
}

/// One peer's share of a transfer's economics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerEconomics {
    /// Amount we have paid the peer (including payments still in flight).
    pub spent: Amount,
    /// Bytes the peer has delivered to us.
    pub bytes_downloaded: u64,
}

/// Point-in-time copy of a transfer's economics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentEconomicsSnapshot {
    pub info_hash: InfoHash,
    pub total_earned: Amount,
    pub total_spent: Amount,
    pub peers: HashMap<PeerIdentity, PeerEconomics>,
}

impl TorrentEconomics {
    pub fn new(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            total_earned: AtomicAmount::default(),
            total_spent: AtomicAmount::default(),
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn total_earned(&self) -> Amount {
        self.total_earned.load()
    }

    pub fn total_spent(&self) -> Amount {
        self.total_spent.load()
    }

    /// Amount spent on `peer` for this transfer.
    pub fn spent_on(&self, peer: &PeerIdentity) -> Amount {
        self.peers.lock().get(peer).map(|p| p.spent).unwrap_or_default()
    }

    /// Bytes `peer` has delivered for this transfer.
    pub fn bytes_from(&self, peer: &PeerIdentity) -> u64 {
        self.peers.lock().get(peer).map(|p| p.bytes_downloaded).unwrap_or_default()
    }

    /// Record an amount earned by serving a request.
    pub fn add_earned(&self, amount: Amount) -> Amount {
        self.total_earned.add(amount)
    }

    /// Record bytes delivered by `peer`.
    pub fn add_downloaded(&self, peer: PeerIdentity, bytes: u64) {
        let mut peers = self.peers.lock();
        let entry = peers.entry(peer).or_default();
        entry.bytes_downloaded = entry.bytes_downloaded.saturating_add(bytes);
    }

    pub(crate) fn add_spent(&self, peer: PeerIdentity, amount: Amount) {
        self.total_spent.add(amount);
        let mut peers = self.peers.lock();
        let entry = peers.entry(peer).or_default();
        entry.spent += amount;
    }

    pub(crate) fn remove_spent(&self, peer: PeerIdentity, amount: Amount) {
        self.total_spent.sub(amount);
        if let Some(entry) = self.peers.lock().get_mut(&peer) {
            entry.spent = entry.spent.saturating_sub(amount);
        }
    }

    pub fn snapshot(&self) -> TorrentEconomicsSnapshot {
        TorrentEconomicsSnapshot {
            info_hash: self.info_hash,
            total_earned: self.total_earned(),
            total_spent: self.total_spent(),
            peers: self.peers.lock().clone(),
        }
    }
}

//! Identifiers for peers, connections, ledger accounts and transfers.

use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{B256, FixedBytes};

/// Info hash identifying a transfer (torrent) in the swarm.
pub type InfoHash = FixedBytes<20>;

/// Stable public key of a remote participant.
///
/// Independent of any single connection: one identity may be reachable over
/// several simultaneous connections, all sharing its balance and history.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::AsRef,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PeerIdentity(B256);

impl PeerIdentity {
    /// Create an identity from raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.0.to_string();
        hex.truncate(10);
        hex
    }
}

impl From<[u8; 32]> for PeerIdentity {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PeerIdentity {
    type Err = alloy_primitives::hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s).map(Self)
    }
}

/// Account on the settlement ledger that payments are sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::From)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AccountId(String);

impl AccountId {
    /// Wrap a ledger account address.
    pub fn new(account: impl Into<String>) -> Self {
        Self(account.into())
    }

    /// The account address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(account: &str) -> Self {
        Self(account.to_string())
    }
}

/// Process-unique identifier of one transport-level connection (wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("conn#{_0}")]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Unique identifier of a submitted payment, used to correlate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("payment#{_0}")]
pub struct PaymentId(u64);

static NEXT_PAYMENT_ID: AtomicU64 = AtomicU64::new(1);

impl PaymentId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_PAYMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_identity_roundtrip_hex() {
        let peer = PeerIdentity::new([0xab; 32]);
        let parsed: PeerIdentity = peer.to_string().parse().unwrap();
        assert_eq!(parsed, peer);
        assert_eq!(peer.short(), "0xabababab");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert_eq!(ConnectionId::from_raw(7).to_string(), "conn#7");
    }
}

//! Test utilities and mocks for tollgate crates.
//!
//! - [`MockWire`] records every outbound protocol call
//! - [`MockLedger`] is a scriptable in-memory settlement ledger
//! - [`MockTransfer`] / [`MockTransferEngine`] stand in for the swarm engine

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod ledger;
mod transfer;
mod wire;

pub use ledger::MockLedger;
pub use transfer::{MockTransfer, MockTransferEngine, MockTransferError};
pub use wire::{MockWire, WireCall};

use tollgate_primitives::{Amount, InfoHash, PeerIdentity};

/// Deterministic peer identity.
pub fn test_peer(n: u8) -> PeerIdentity {
    PeerIdentity::new([n; 32])
}

/// Deterministic info hash.
pub fn test_info_hash(n: u8) -> InfoHash {
    InfoHash::from([n; 20])
}

/// Parse a decimal amount literal.
pub fn amount(s: &str) -> Amount {
    s.parse().expect("valid amount literal")
}

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

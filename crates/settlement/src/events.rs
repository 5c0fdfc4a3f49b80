//! Events published by the settlement service.

use tollgate_primitives::{AccountId, Amount, PeerIdentity};

/// Settlement-level event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    /// The ledger client connected. Emitted exactly once.
    Ready {
        /// Our ledger account.
        account: AccountId,
    },
    /// A settlement credited our account; `peer` paid it.
    Incoming {
        peer: PeerIdentity,
        amount: Amount,
        reference: String,
    },
    /// A settlement debited our account.
    Outgoing {
        destination: AccountId,
        amount: Amount,
        reference: String,
    },
}

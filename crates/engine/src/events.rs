//! Application-level events.

use tollgate_primitives::{AccountId, Amount, InfoHash, PaymentId, PeerIdentity};

/// Event published by the [`PaymentEngine`](crate::PaymentEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The settlement ledger is connected; transfers start.
    WalletReady { account: AccountId },
    /// A peer paid us and was credited.
    IncomingPayment {
        peer: PeerIdentity,
        amount: Amount,
        /// The peer's balance after the credit.
        balance: Amount,
    },
    /// The ledger accepted a payment we sent.
    OutgoingPayment {
        id: PaymentId,
        peer: PeerIdentity,
        info_hash: InfoHash,
        amount: Amount,
    },
    /// A transfer finished downloading.
    TransferDone {
        info_hash: InfoHash,
        total_spent: Amount,
        total_earned: Amount,
    },
    /// A transfer reported an error.
    TransferFailed { info_hash: InfoHash, reason: String },
}

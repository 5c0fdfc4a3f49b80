//! Error types for collaborator operations.

/// Error reported by a settlement ledger client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger or our account on it could not be reached or resolved.
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    /// No path exists to deliver the requested amount to the destination.
    #[error("no route to {destination}")]
    NoRoute {
        /// The unreachable destination account.
        destination: String,
    },

    /// The ledger rejected the transfer.
    #[error("payment rejected: {0}")]
    Rejected(String),

    /// Any other ledger failure.
    #[error("ledger error: {0}")]
    Other(String),
}

/// Error surfaced by the settlement adapter to the payment policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// The ledger client is not ready yet and the caller stopped waiting.
    #[error("settlement client not ready")]
    NotReady,

    /// Resolving or connecting to the ledger failed.
    #[error("settlement connect failed: {0}")]
    ConnectFailed(LedgerError),

    /// The requested amount could not be normalized (no path found).
    #[error("amount normalization failed: {0}")]
    Normalization(LedgerError),

    /// The ledger did not accept a submitted payment.
    #[error("payment submission failed: {0}")]
    Submission(LedgerError),

    /// A converted amount does not fit.
    #[error("amount overflow while normalizing")]
    AmountOverflow,

    /// The settlement service has stopped.
    #[error("settlement service stopped")]
    ServiceStopped,
}

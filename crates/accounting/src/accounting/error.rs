//! Accounting error types.

use tollgate_primitives::PaymentId;

/// Errors that can occur during accounting operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountingError {
    /// No in-flight payment with this id (already committed or rolled back).
    #[error("{0} is not in flight")]
    UnknownPayment(PaymentId),
}

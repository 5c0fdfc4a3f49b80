//! Settlement operations consumed by the payment policy.

use tollgate_primitives::{AccountId, Amount};

use crate::{PaymentParams, PaymentReceipt, SettlementError};

/// Normalizes and submits payments on behalf of the payment decider.
///
/// Implemented by the settlement adapter; both operations wait for ledger
/// readiness before doing any work.
#[async_trait::async_trait]
pub trait Settlement: Send + Sync {
    /// Convert `destination_amount`, denominated in the destination's unit,
    /// into the amount we must send.
    async fn normalize_amount(
        &self,
        destination: &AccountId,
        destination_amount: Amount,
    ) -> Result<Amount, SettlementError>;

    /// Submit a payment and wait for the ledger's verdict.
    async fn send_payment(&self, params: PaymentParams) -> Result<PaymentReceipt, SettlementError>;
}

#[async_trait::async_trait]
impl<T: Settlement + ?Sized> Settlement for std::sync::Arc<T> {
    async fn normalize_amount(
        &self,
        destination: &AccountId,
        destination_amount: Amount,
    ) -> Result<Amount, SettlementError> {
        (**self).normalize_amount(destination, destination_amount).await
    }

    async fn send_payment(&self, params: PaymentParams) -> Result<PaymentReceipt, SettlementError> {
        (**self).send_payment(params).await
    }
}

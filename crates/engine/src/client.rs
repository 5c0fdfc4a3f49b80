//! A transfer engine with payments attached to every transfer.

use std::sync::Arc;

use tollgate_api::TransferEngine;
use tracing::info;

use crate::PaymentEngine;

/// Composes a [`TransferEngine`] with a [`PaymentEngine`]: every transfer it
/// creates is attached for payment handling.
#[derive(Debug)]
pub struct PaidClient<E> {
    transfers: E,
    payments: PaymentEngine,
}

impl<E: TransferEngine> PaidClient<E> {
    pub fn new(transfers: E, payments: PaymentEngine) -> Self {
        Self { transfers, payments }
    }

    /// Seed `source` and charge peers that download it.
    pub fn seed(&self, source: &str) -> Result<Arc<E::Transfer>, E::Error> {
        let transfer = self.transfers.seed(source)?;
        self.payments.attach(Arc::clone(&transfer));
        info!(%source, "Seeding");
        Ok(transfer)
    }

    /// Download `source`, paying peers that request payment.
    pub fn download(&self, source: &str) -> Result<Arc<E::Transfer>, E::Error> {
        let transfer = self.transfers.download(source)?;
        self.payments.attach(Arc::clone(&transfer));
        info!(%source, "Downloading");
        Ok(transfer)
    }

    pub fn payments(&self) -> &PaymentEngine {
        &self.payments
    }

    pub fn transfers(&self) -> &E {
        &self.transfers
    }
}

//! Payment engine metrics.

use metrics::{Counter, Gauge};

/// Payment engine metrics.
#[derive(Clone, Debug)]
pub(crate) struct PaymentMetrics {
    /// Requests paid for out of a peer's balance
    pub(crate) charges_total: Counter,
    /// Requests refused for insufficient balance
    pub(crate) insufficient_balance_total: Counter,
    /// Payments the ledger accepted
    pub(crate) payments_sent_total: Counter,
    /// Payments refused by the decider
    pub(crate) payments_refused_total: Counter,
    /// Payments rolled back after a failed submission
    pub(crate) payments_failed_total: Counter,
    /// Payment requests dropped because normalization failed
    pub(crate) payments_abandoned_total: Counter,
    /// Payment requests skipped while another payment was outstanding
    pub(crate) payments_skipped_total: Counter,
    /// Settlements credited to peer balances
    pub(crate) incoming_credits_total: Counter,
    /// Connections with a completed handshake
    pub(crate) connections: Gauge,
}

impl Default for PaymentMetrics {
    fn default() -> Self {
        Self {
            charges_total: metrics::counter!("payments.requests.charged_total"),
            insufficient_balance_total: metrics::counter!(
                "payments.requests.insufficient_balance_total"
            ),
            payments_sent_total: metrics::counter!("payments.outgoing.sent_total"),
            payments_refused_total: metrics::counter!("payments.outgoing.refused_total"),
            payments_failed_total: metrics::counter!("payments.outgoing.failed_total"),
            payments_abandoned_total: metrics::counter!("payments.outgoing.abandoned_total"),
            payments_skipped_total: metrics::counter!("payments.outgoing.skipped_total"),
            incoming_credits_total: metrics::counter!("payments.incoming.credited_total"),
            connections: metrics::gauge!("payments.connections"),
        }
    }
}

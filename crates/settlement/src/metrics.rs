//! Settlement service metrics.

use metrics::Counter;

/// Settlement service metrics.
#[derive(Clone, Debug)]
pub(crate) struct SettlementMetrics {
    /// Normalizations answered from the rate cache
    pub(crate) rate_cache_hits_total: Counter,
    /// Normalizations that needed a ledger quote
    pub(crate) rate_cache_misses_total: Counter,
    /// Ledger quotes that failed
    pub(crate) quote_failures_total: Counter,
    /// Payments the ledger accepted
    pub(crate) payments_accepted_total: Counter,
    /// Payments the ledger rejected
    pub(crate) payments_rejected_total: Counter,
    /// Settlements crediting our account
    pub(crate) incoming_total: Counter,
    /// Settlements debiting our account
    pub(crate) outgoing_total: Counter,
    /// Notifications dropped for a missing or unparseable tag
    pub(crate) malformed_notifications_total: Counter,
}

impl Default for SettlementMetrics {
    fn default() -> Self {
        Self {
            rate_cache_hits_total: metrics::counter!("settlement.rate_cache.hits_total"),
            rate_cache_misses_total: metrics::counter!("settlement.rate_cache.misses_total"),
            quote_failures_total: metrics::counter!("settlement.quote.failures_total"),
            payments_accepted_total: metrics::counter!("settlement.payments.accepted_total"),
            payments_rejected_total: metrics::counter!("settlement.payments.rejected_total"),
            incoming_total: metrics::counter!("settlement.notifications.incoming_total"),
            outgoing_total: metrics::counter!("settlement.notifications.outgoing_total"),
            malformed_notifications_total: metrics::counter!(
                "settlement.notifications.malformed_total"
            ),
        }
    }
}

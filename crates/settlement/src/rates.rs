//! Time-bounded exchange rate cache.
//!
//! Normalizing an amount can need a cross-ledger path lookup. A quote for a
//! destination account is reused while it is fresh and the requested amount
//! is within a small tolerance of the quoted one; the cached rate is then
//! applied to the new amount without a network round trip.

use std::time::Duration;

use hashlink::LruCache;
use tokio::time::Instant;
use tollgate_api::PaymentConfig;
use tollgate_primitives::{AccountId, Amount};

/// A quote: sending `source_amount` delivers `destination_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Quote {
    pub(crate) destination_amount: Amount,
    pub(crate) source_amount: Amount,
    pub(crate) quoted_at: Instant,
}

/// LRU cache of the latest quote per destination account.
#[derive(Debug)]
pub(crate) struct RateCache {
    quotes: LruCache<AccountId, Quote>,
    refresh: Duration,
    tolerance_percent: u64,
}

impl RateCache {
    pub(crate) fn new(capacity: usize, refresh: Duration, tolerance_percent: u64) -> Self {
        Self { quotes: LruCache::new(capacity.max(1)), refresh, tolerance_percent }
    }

    pub(crate) fn from_config(config: &impl PaymentConfig) -> Self {
        Self::new(
            config.rate_cache_capacity(),
            config.rate_cache_refresh(),
            config.rate_cache_tolerance_percent(),
        )
    }

    /// Source amount for `destination_amount` from a cached rate, if usable.
    ///
    /// Expired entries are evicted on lookup.
    pub(crate) fn lookup(
        &mut self,
        destination: &AccountId,
        destination_amount: Amount,
        now: Instant,
    ) -> Option<Amount> {
        let quote = *self.quotes.get(destination)?;
        if now.saturating_duration_since(quote.quoted_at) >= self.refresh {
            self.quotes.remove(destination);
            return None;
        }
        if !self.within_tolerance(quote.destination_amount, destination_amount) {
            return None;
        }
        if destination_amount == quote.destination_amount {
            return Some(quote.source_amount);
        }
        destination_amount.checked_mul_div(quote.source_amount, quote.destination_amount)
    }

    pub(crate) fn insert(&mut self, destination: AccountId, quote: Quote) {
        if quote.destination_amount.is_zero() {
            return;
        }
        self.quotes.insert(destination, quote);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.quotes.len()
    }

    fn within_tolerance(&self, cached: Amount, requested: Amount) -> bool {
        let diff = cached.units().abs_diff(requested.units());
        diff.saturating_mul(100) <= cached.units().saturating_mul(self.tolerance_percent as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_test_utils::amount;

    const REFRESH: Duration = Duration::from_secs(60);

    fn quote(destination: &str, source: &str, quoted_at: Instant) -> Quote {
        Quote { destination_amount: amount(destination), source_amount: amount(source), quoted_at }
    }

    #[test]
    fn test_exact_amount_reuses_quote() {
        let mut cache = RateCache::new(8, REFRESH, 1);
        let now = Instant::now();
        cache.insert("bob".into(), quote("1", "2", now));

        assert_eq!(cache.lookup(&"bob".into(), amount("1"), now), Some(amount("2")));
    }

    #[test]
    fn test_nearby_amount_applies_cached_rate() {
        let mut cache = RateCache::new(8, REFRESH, 1);
        let now = Instant::now();
        cache.insert("bob".into(), quote("1", "2", now));

        assert_eq!(cache.lookup(&"bob".into(), amount("1.005"), now), Some(amount("2.01")));
        assert_eq!(cache.lookup(&"bob".into(), amount("0.99"), now), Some(amount("1.98")));
    }

    #[test]
    fn test_amount_outside_tolerance_misses() {
        let mut cache = RateCache::new(8, REFRESH, 1);
        let now = Instant::now();
        cache.insert("bob".into(), quote("1", "2", now));

        assert_eq!(cache.lookup(&"bob".into(), amount("1.02"), now), None);
        assert_eq!(cache.lookup(&"carol".into(), amount("1"), now), None);
    }

    #[test]
    fn test_expired_quote_is_evicted() {
        let mut cache = RateCache::new(8, REFRESH, 1);
        let now = Instant::now();
        cache.insert("bob".into(), quote("1", "2", now));

        assert_eq!(cache.lookup(&"bob".into(), amount("1"), now + REFRESH), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let mut cache = RateCache::new(1, REFRESH, 1);
        let now = Instant::now();
        cache.insert("bob".into(), quote("1", "1", now));
        cache.insert("carol".into(), quote("1", "1", now));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&"bob".into(), amount("1"), now), None);
    }
}

//! Configuration trait for the payment policy.
//!
//! Traits define *what* configuration is needed; CLI args and defaults
//! implement the trait directly, and components read what they need at
//! construction.

use core::time::Duration;

use tollgate_primitives::{Amount, PriceUnit};

/// Configuration for payment-gated flow control.
///
/// # Defaults
///
/// - Starting bid: 100 × price
/// - Bid increase / decrease factors: 1.5 / 0.95
/// - Minimum ledger amount: 0.0001
/// - Payment rate limit: 3 payments per 5 seconds per peer and transfer
/// - Rate cache: 60 second refresh, 1% tolerance
#[auto_impl::auto_impl(&, Arc)]
pub trait PaymentConfig: Send + Sync {
    /// Price charged per [`price_unit`](Self::price_unit) of requested data.
    fn price(&self) -> Amount;

    /// Unit the price is quoted in.
    fn price_unit(&self) -> PriceUnit;

    /// Multiple of the price a connection's bid starts at.
    fn starting_bid_multiplier(&self) -> u64;

    /// Factor applied to bids when the peer accepts our payment request.
    fn bid_increase_factor(&self) -> f64;

    /// Factor applied to a bid when the peer calls it too high.
    fn bid_decrease_factor(&self) -> f64;

    /// Smallest amount the settlement network can move.
    fn min_ledger_amount(&self) -> Amount;

    /// Trailing window for the outgoing payment rate limit.
    fn payment_window(&self) -> Duration;

    /// Payments allowed per peer and transfer within the window.
    fn max_payments_per_window(&self) -> usize;

    /// How long a cached exchange rate stays valid.
    fn rate_cache_refresh(&self) -> Duration;

    /// How far (in percent) a requested amount may differ from a cached
    /// quote and still reuse its rate.
    fn rate_cache_tolerance_percent(&self) -> u64;

    /// Maximum number of destination accounts with a cached rate.
    fn rate_cache_capacity(&self) -> usize;

    /// Whether a new payment to a peer is skipped while one is outstanding.
    fn guard_in_flight_payments(&self) -> bool;

    /// Initial bid for a new connection.
    fn starting_bid(&self) -> Amount {
        self.price().saturating_mul(self.starting_bid_multiplier())
    }
}

//! Default constants for the payment policy.

use tollgate_primitives::Amount;

/// Default price per byte (0.00000000001).
pub(crate) const DEFAULT_PRICE: Amount = Amount::from_units(10);

/// Default starting bid as a multiple of the price.
pub(crate) const DEFAULT_STARTING_BID_MULTIPLIER: u64 = 100;

/// Default bid increase after the peer accepted our payment.
pub(crate) const DEFAULT_BID_INCREASE_FACTOR: f64 = 1.5;

/// Default bid decrease after the peer called our request too high.
pub(crate) const DEFAULT_BID_DECREASE_FACTOR: f64 = 0.95;

/// Default minimum amount the ledger can move (0.0001).
pub(crate) const DEFAULT_MIN_LEDGER_AMOUNT: Amount = Amount::from_units(100_000_000);

/// Default payment rate-limit window in seconds.
pub(crate) const DEFAULT_PAYMENT_WINDOW_SECS: u64 = 5;

/// Default payments allowed per peer and transfer within the window.
pub(crate) const DEFAULT_MAX_PAYMENTS_PER_WINDOW: usize = 3;

/// Default rate cache refresh interval in seconds.
pub(crate) const DEFAULT_RATE_CACHE_REFRESH_SECS: u64 = 60;

/// Default rate cache tolerance as a percentage.
pub(crate) const DEFAULT_RATE_CACHE_TOLERANCE_PERCENT: u64 = 1;

/// Default number of destination accounts with a cached rate.
pub(crate) const DEFAULT_RATE_CACHE_CAPACITY: usize = 1024;

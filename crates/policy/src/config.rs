//! Default payment configuration.

use core::time::Duration;

use tollgate_api::PaymentConfig;
use tollgate_primitives::{Amount, PriceUnit};

use crate::constants::*;

/// Default payment configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPaymentConfig;

impl PaymentConfig for DefaultPaymentConfig {
    fn price(&self) -> Amount {
        DEFAULT_PRICE
    }

    fn price_unit(&self) -> PriceUnit {
        PriceUnit::Byte
    }

    fn starting_bid_multiplier(&self) -> u64 {
        DEFAULT_STARTING_BID_MULTIPLIER
    }

    fn bid_increase_factor(&self) -> f64 {
        DEFAULT_BID_INCREASE_FACTOR
    }

    fn bid_decrease_factor(&self) -> f64 {
        DEFAULT_BID_DECREASE_FACTOR
    }

    fn min_ledger_amount(&self) -> Amount {
        DEFAULT_MIN_LEDGER_AMOUNT
    }

    fn payment_window(&self) -> Duration {
        Duration::from_secs(DEFAULT_PAYMENT_WINDOW_SECS)
    }

    fn max_payments_per_window(&self) -> usize {
        DEFAULT_MAX_PAYMENTS_PER_WINDOW
    }

    fn rate_cache_refresh(&self) -> Duration {
        Duration::from_secs(DEFAULT_RATE_CACHE_REFRESH_SECS)
    }

    fn rate_cache_tolerance_percent(&self) -> u64 {
        DEFAULT_RATE_CACHE_TOLERANCE_PERCENT
    }

    fn rate_cache_capacity(&self) -> usize {
        DEFAULT_RATE_CACHE_CAPACITY
    }

    fn guard_in_flight_payments(&self) -> bool {
        true
    }
}

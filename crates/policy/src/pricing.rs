//! Pricing of requested data.
//!
//! ```text
//! charge = price × units(bytes)
//! ```
//!
//! where `units` is the byte count itself or the number of started
//! kilobytes, depending on the configured [`PriceUnit`].

use tollgate_api::PaymentConfig;
use tollgate_primitives::{Amount, PriceUnit};

/// Trait for pricing data requests.
#[auto_impl::auto_impl(&, Arc)]
pub trait Pricer: Send + Sync {
    /// Amount to charge for serving `bytes`.
    fn price_for(&self, bytes: u64) -> Amount;
}

/// Fixed price per byte or per kilobyte.
#[derive(Debug, Clone, Copy)]
pub struct FixedPricer {
    price: Amount,
    unit: PriceUnit,
}

impl FixedPricer {
    pub fn new(price: Amount, unit: PriceUnit) -> Self {
        Self { price, unit }
    }

    pub fn from_config(config: &impl PaymentConfig) -> Self {
        Self::new(config.price(), config.price_unit())
    }

    /// Get the configured price.
    pub fn price(&self) -> Amount {
        self.price
    }

    /// Unit the price is quoted in.
    pub fn unit(&self) -> PriceUnit {
        self.unit
    }
}

impl Pricer for FixedPricer {
    fn price_for(&self, bytes: u64) -> Amount {
        self.price.saturating_mul(self.unit.units_for(bytes))
    }
}

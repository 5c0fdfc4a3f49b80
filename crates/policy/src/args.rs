//! CLI arguments for payment policy configuration.

use core::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};
use tollgate_api::PaymentConfig;
use tollgate_primitives::{Amount, PriceUnit};

use crate::{ConfigError, constants::*};

/// CLI wrapper for [`PriceUnit`] with clap integration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, strum::FromRepr, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PriceUnitArg {
    /// Price per byte requested (default).
    #[default]
    Byte = 0,
    /// Price per started kilobyte (1024 bytes) requested.
    Kilobyte = 1,
}

impl From<PriceUnitArg> for PriceUnit {
    fn from(arg: PriceUnitArg) -> Self {
        PriceUnit::from_repr(arg as u8).unwrap_or_default()
    }
}

impl From<PriceUnit> for PriceUnitArg {
    fn from(unit: PriceUnit) -> Self {
        PriceUnitArg::from_repr(unit as u8).unwrap_or_default()
    }
}

/// Payment policy CLI arguments. Amounts are decimals in our settlement unit.
#[derive(Debug, Args, Clone, Serialize, Deserialize)]
#[command(next_help_heading = "Payment Policy")]
#[serde(default)]
pub struct PaymentArgs {
    /// Price charged per unit of requested data
    #[arg(long = "payment.price", default_value_t = DEFAULT_PRICE)]
    pub price: Amount,

    /// Unit the price is quoted in
    #[arg(long = "payment.price-unit", value_enum, default_value_t = PriceUnitArg::Byte)]
    pub price_unit: PriceUnitArg,

    /// Starting bid of a new connection, as a multiple of the price
    #[arg(long = "payment.starting-bid-multiplier", default_value_t = DEFAULT_STARTING_BID_MULTIPLIER)]
    pub starting_bid_multiplier: u64,

    /// Bid multiplier applied when a peer accepts our payment
    #[arg(long = "payment.bid-increase", default_value_t = DEFAULT_BID_INCREASE_FACTOR)]
    pub bid_increase_factor: f64,

    /// Bid multiplier applied when a peer calls our request too high
    #[arg(long = "payment.bid-decrease", default_value_t = DEFAULT_BID_DECREASE_FACTOR)]
    pub bid_decrease_factor: f64,

    /// Smallest amount the settlement ledger can move
    #[arg(long = "payment.min-ledger-amount", default_value_t = DEFAULT_MIN_LEDGER_AMOUNT)]
    pub min_ledger_amount: Amount,

    /// Trailing window of the outgoing payment rate limit, in seconds
    #[arg(long = "payment.window-secs", default_value_t = DEFAULT_PAYMENT_WINDOW_SECS)]
    pub payment_window_secs: u64,

    /// Payments allowed per peer and transfer within the window
    #[arg(long = "payment.max-per-window", default_value_t = DEFAULT_MAX_PAYMENTS_PER_WINDOW)]
    pub max_payments_per_window: usize,

    /// Seconds a cached exchange rate stays valid
    #[arg(long = "payment.rate-refresh-secs", default_value_t = DEFAULT_RATE_CACHE_REFRESH_SECS)]
    pub rate_cache_refresh_secs: u64,

    /// Percent a requested amount may differ from a cached quote and reuse its rate
    #[arg(long = "payment.rate-tolerance-percent", default_value_t = DEFAULT_RATE_CACHE_TOLERANCE_PERCENT)]
    pub rate_cache_tolerance_percent: u64,

    /// Destination accounts kept in the rate cache
    #[arg(long = "payment.rate-cache-capacity", default_value_t = DEFAULT_RATE_CACHE_CAPACITY)]
    pub rate_cache_capacity: usize,

    /// Allow a new payment to a peer while an earlier one is unsettled
    #[arg(long = "payment.allow-concurrent", default_value_t = false)]
    pub allow_concurrent_payments: bool,
}

impl Default for PaymentArgs {
    fn default() -> Self {
        Self {
            price: DEFAULT_PRICE,
            price_unit: PriceUnitArg::default(),
            starting_bid_multiplier: DEFAULT_STARTING_BID_MULTIPLIER,
            bid_increase_factor: DEFAULT_BID_INCREASE_FACTOR,
            bid_decrease_factor: DEFAULT_BID_DECREASE_FACTOR,
            min_ledger_amount: DEFAULT_MIN_LEDGER_AMOUNT,
            payment_window_secs: DEFAULT_PAYMENT_WINDOW_SECS,
            max_payments_per_window: DEFAULT_MAX_PAYMENTS_PER_WINDOW,
            rate_cache_refresh_secs: DEFAULT_RATE_CACHE_REFRESH_SECS,
            rate_cache_tolerance_percent: DEFAULT_RATE_CACHE_TOLERANCE_PERCENT,
            rate_cache_capacity: DEFAULT_RATE_CACHE_CAPACITY,
            allow_concurrent_payments: false,
        }
    }
}

impl PaymentArgs {
    /// Validate argument ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_bid_multiplier == 0 {
            return Err(ConfigError::invalid("starting-bid-multiplier", "must be at least 1"));
        }
        if !(self.bid_increase_factor.is_finite() && self.bid_increase_factor > 1.0) {
            return Err(ConfigError::invalid("bid-increase", "must be greater than 1"));
        }
        if !(self.bid_decrease_factor > 0.0 && self.bid_decrease_factor < 1.0) {
            return Err(ConfigError::invalid("bid-decrease", "must be between 0 and 1 exclusive"));
        }
        if self.payment_window_secs == 0 {
            return Err(ConfigError::invalid("window-secs", "must be at least 1"));
        }
        if self.max_payments_per_window == 0 {
            return Err(ConfigError::invalid("max-per-window", "must be at least 1"));
        }
        if self.rate_cache_capacity == 0 {
            return Err(ConfigError::invalid("rate-cache-capacity", "must be at least 1"));
        }
        Ok(())
    }

    /// Parse and validate a TOML configuration. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let args: Self = toml::from_str(s)?;
        args.validate()?;
        Ok(args)
    }
}

impl PaymentConfig for PaymentArgs {
    fn price(&self) -> Amount {
        self.price
    }

    fn price_unit(&self) -> PriceUnit {
        self.price_unit.into()
    }

    fn starting_bid_multiplier(&self) -> u64 {
        self.starting_bid_multiplier
    }

    fn bid_increase_factor(&self) -> f64 {
        self.bid_increase_factor
    }

    fn bid_decrease_factor(&self) -> f64 {
        self.bid_decrease_factor
    }

    fn min_ledger_amount(&self) -> Amount {
        self.min_ledger_amount
    }

    fn payment_window(&self) -> Duration {
        Duration::from_secs(self.payment_window_secs)
    }

    fn max_payments_per_window(&self) -> usize {
        self.max_payments_per_window
    }

    fn rate_cache_refresh(&self) -> Duration {
        Duration::from_secs(self.rate_cache_refresh_secs)
    }

    fn rate_cache_tolerance_percent(&self) -> u64 {
        self.rate_cache_tolerance_percent
    }

    fn rate_cache_capacity(&self) -> usize {
        self.rate_cache_capacity
    }

    fn guard_in_flight_payments(&self) -> bool {
        !self.allow_concurrent_payments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::Parser;

    use crate::DefaultPaymentConfig;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        payment: PaymentArgs,
    }

    #[test]
    fn test_defaults_match_default_config() {
        let args = PaymentArgs::default();
        let defaults = DefaultPaymentConfig;
        assert!(args.validate().is_ok());
        assert_eq!(args.price(), defaults.price());
        assert_eq!(args.starting_bid(), defaults.starting_bid());
        assert_eq!(args.payment_window(), defaults.payment_window());
        assert_eq!(args.guard_in_flight_payments(), defaults.guard_in_flight_payments());
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "tollgate",
            "--payment.price",
            "0.0001",
            "--payment.price-unit",
            "kilobyte",
            "--payment.max-per-window",
            "5",
        ]);
        assert_eq!(cli.payment.price, "0.0001".parse().unwrap());
        assert_eq!(cli.payment.price_unit(), PriceUnit::Kilobyte);
        assert_eq!(cli.payment.max_payments_per_window, 5);
        assert_eq!(cli.payment.bid_increase_factor, DEFAULT_BID_INCREASE_FACTOR);
    }

    #[test]
    fn test_validate_rejects_bad_factors() {
        let args = PaymentArgs { bid_decrease_factor: 1.0, ..Default::default() };
        assert_matches!(args.validate(), Err(ConfigError::Invalid { name: "bid-decrease", .. }));

        let args = PaymentArgs { bid_increase_factor: 0.5, ..Default::default() };
        assert_matches!(args.validate(), Err(ConfigError::Invalid { name: "bid-increase", .. }));

        let args = PaymentArgs { max_payments_per_window: 0, ..Default::default() };
        assert_matches!(args.validate(), Err(ConfigError::Invalid { name: "max-per-window", .. }));
    }

    #[test]
    fn test_from_toml() {
        let args = PaymentArgs::from_toml_str(
            r#"
            price = "0.0001"
            price_unit = "kilobyte"
            payment_window_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(args.price, "0.0001".parse().unwrap());
        assert_eq!(args.price_unit, PriceUnitArg::Kilobyte);
        assert_eq!(args.payment_window(), Duration::from_secs(10));
        assert_eq!(args.max_payments_per_window, DEFAULT_MAX_PAYMENTS_PER_WINDOW);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert_matches!(
            PaymentArgs::from_toml_str("payment_window_secs = 0"),
            Err(ConfigError::Invalid { name: "window-secs", .. })
        );
        assert_matches!(PaymentArgs::from_toml_str("price = 5"), Err(ConfigError::Parse(_)));
    }
}

//! Fixed-point settlement amounts.
//!
//! Amounts are unsigned decimals with [`AMOUNT_DECIMALS`] fractional digits,
//! stored as an integer count of base units. Being unsigned, no balance built
//! from them can go below zero.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign};
use core::str::FromStr;

/// Number of fractional decimal digits carried by an [`Amount`].
pub const AMOUNT_DECIMALS: u32 = 12;

/// Base units per whole currency unit.
const SCALE: u128 = 10u128.pow(AMOUNT_DECIMALS);

/// Resolution of multiplicative factors passed to [`Amount::scale`].
const FACTOR_PRECISION: u128 = 1_000_000;

/// A non-negative decimal amount of value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

/// Errors from parsing a decimal amount string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    /// Input was empty.
    #[error("empty amount")]
    Empty,

    /// Input contained something other than digits and a single point.
    #[error("invalid amount: {0}")]
    Invalid(String),

    /// More fractional digits than an amount can represent.
    #[error("amount {0} has more than {AMOUNT_DECIMALS} decimal places")]
    TooPrecise(String),

    /// Value does not fit.
    #[error("amount {0} is too large")]
    Overflow(String),
}

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Create an amount from raw base units.
    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    /// Create an amount from a whole number of currency units.
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole as u128 * SCALE)
    }

    /// Raw base units.
    pub const fn units(self) -> u128 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiply by an integer quantity, e.g. a byte count.
    pub fn checked_mul(self, quantity: u64) -> Option<Self> {
        self.0.checked_mul(quantity as u128).map(Self)
    }

    pub fn saturating_mul(self, quantity: u64) -> Self {
        Self(self.0.saturating_mul(quantity as u128))
    }

    /// Compute `self * numerator / denominator` without intermediate rounding.
    ///
    /// Returns `None` on overflow or a zero denominator.
    pub fn checked_mul_div(self, numerator: Self, denominator: Self) -> Option<Self> {
        if denominator.is_zero() {
            return None;
        }
        self.0
            .checked_mul(numerator.0)
            .map(|product| Self(product / denominator.0))
    }

    /// Divide by an integer, rounding up.
    pub fn div_ceil(self, divisor: u64) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        Some(Self(self.0.div_ceil(divisor as u128)))
    }

    /// Scale by a multiplicative factor.
    ///
    /// A nonzero amount always moves in the direction of the factor: factors
    /// below one round down and factors above one round up, with a minimum
    /// step of one base unit.
    pub fn scale(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return Self::ZERO;
        }
        if self.is_zero() || factor == 1.0 {
            return self;
        }

        // Factors are applied as parts-per-million so common values like 0.95 are exact.
        let ppm = (factor * FACTOR_PRECISION as f64).round() as u128;
        if factor < 1.0 {
            let scaled = match self.0.checked_mul(ppm) {
                Some(product) => product / FACTOR_PRECISION,
                None => (self.0 / FACTOR_PRECISION).saturating_mul(ppm),
            };
            Self(scaled.min(self.0 - 1))
        } else {
            let scaled = match self.0.checked_mul(ppm) {
                Some(product) => product.div_ceil(FACTOR_PRECISION),
                None => self.0.div_ceil(FACTOR_PRECISION).saturating_mul(ppm),
            };
            Self(scaled.max(self.0.saturating_add(1)))
        }
    }

    /// Lossy conversion to whole currency units, for ratios and diagnostics.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

impl Add for Amount {
    type Output = Self;

    /// Saturating addition.
    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Self) {
        *self = self.saturating_add(other);
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = AMOUNT_DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountParseError::Invalid(s.to_string()));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(AmountParseError::Invalid(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountParseError::Overflow(s.to_string());
        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| overflow())?
        };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let padding = AMOUNT_DECIMALS - frac.len() as u32;
            frac.parse::<u128>().map_err(|_| overflow())? * 10u128.pow(padding)
        };

        whole_units
            .checked_mul(SCALE)
            .and_then(|units| units.checked_add(frac_units))
            .map(Self)
            .ok_or_else(overflow)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//! Core primitive types for payment-gated transfers.
//!
//! This crate provides the value and identity types shared by every layer of
//! the stack, kept separate to avoid circular dependencies.

mod amount;
mod identity;

pub use amount::{AMOUNT_DECIMALS, Amount, AmountParseError};
pub use identity::{AccountId, ConnectionId, InfoHash, PaymentId, PeerIdentity};

/// Bytes per kilobyte for [`PriceUnit::Kilobyte`] pricing.
pub const BYTES_PER_KILOBYTE: u64 = 1024;

/// Unit the configured price is quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, strum::Display, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum PriceUnit {
    /// Price applies to every byte requested.
    #[default]
    Byte = 0,

    /// Price applies per started kilobyte (1024 bytes) requested.
    Kilobyte = 1,
}

impl PriceUnit {
    /// Number of billable units in `bytes`, rounding partial units up.
    pub fn units_for(self, bytes: u64) -> u64 {
        match self {
            PriceUnit::Byte => bytes,
            PriceUnit::Kilobyte => bytes.div_ceil(BYTES_PER_KILOBYTE),
        }
    }
}

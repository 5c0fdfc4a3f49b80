//! Payment policy for payment-gated transfers.
//!
//! # Components
//!
//! - [`Pricer`] / [`FixedPricer`] - Price of a data request, per byte or per kilobyte
//! - [`BidController`] / [`Bid`] - Adaptive per-connection pre-payment bids
//! - [`RequestCharger`] - Charges requests we serve and drives choke state
//! - [`PaymentDecider`] - Decides whether to pay peers we download from
//!
//! # Configuration
//!
//! [`DefaultPaymentConfig`] and [`PaymentArgs`] implement
//! [`PaymentConfig`](tollgate_api::PaymentConfig); components read what they
//! need at construction.

mod args;
mod bid;
mod charger;
mod config;
mod constants;
mod decider;
mod error;
mod pricing;

pub use args::{PaymentArgs, PriceUnitArg};
pub use bid::{Bid, BidController};
pub use charger::{ChargeContext, ChargeDecision, RequestCharger};
pub use config::DefaultPaymentConfig;
pub use decider::{PaymentDecider, PaymentDecision, PaymentOutcome, PaymentRequest, RefusalReason};
pub use error::ConfigError;
pub use pricing::{FixedPricer, Pricer};

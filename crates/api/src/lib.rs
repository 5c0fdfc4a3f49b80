//! Tollgate API - interfaces of the collaborators around the payment core.
//!
//! The payment-gated flow-control engine sits between three external systems
//! and only sees them through the traits defined here:
//!
//! - [`Wire`] / [`WireEvent`] - one peer connection and its payment protocol extension
//! - [`Transfer`] / [`TransferEngine`] - the swarm transfer engine
//! - [`LedgerClient`] - the settlement ledger that actually moves value
//!
//! The payment policy reaches the ledger only through [`Settlement`], which the
//! settlement adapter implements on top of a [`LedgerClient`].
//!
//! plus [`PaymentConfig`], the policy configuration surface.
//!
//! # Design Principles
//!
//! - Traits define *what*, implementations define *how*
//! - Inbound protocol events are typed messages, outbound actions are method calls
//! - The transfer engine is composed over, never patched

#![warn(missing_docs)]

mod config;
mod error;
mod ledger;
mod settlement;
mod transfer;
mod wire;

pub use config::*;
pub use error::*;
pub use ledger::*;
pub use settlement::*;
pub use transfer::*;
pub use wire::*;

// Re-export primitives for convenience
pub use tollgate_primitives::{
    AccountId, Amount, ConnectionId, InfoHash, PaymentId, PeerIdentity, PriceUnit,
};

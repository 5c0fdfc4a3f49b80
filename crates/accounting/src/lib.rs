//! Accounting for payment-gated transfers.
//!
//! Per-peer credit balances plus delivery/spend history per (peer, transfer)
//! pair. All amounts are [`Amount`](tollgate_primitives::Amount) decimals in
//! our own settlement unit.
//!
//! # Components
//!
//! - [`Accounting`] - Owner of balances, transfer economics and the tracker
//! - [`PeerBalance`] - Lock-free per-peer balance with atomic check-and-debit
//! - [`DeliveryTracker`] - Bytes delivered, amounts sent, cost-per-byte, speed
//! - [`PaymentReservation`] - Reserve/commit/rollback for optimistic spend
//! - [`TorrentEconomics`] - Earned/spent totals of one transfer

mod accounting;
mod atomic;
mod torrent;
mod tracker;

pub use accounting::{
    Accounting, AccountingError, ChargeOutcome, PaymentReservation, PeerBalance, Sufficiency,
};
pub use torrent::{PeerEconomics, TorrentEconomics, TorrentEconomicsSnapshot};
pub use tracker::{
    DeliveryRecord, DeliveryTracker, Filter, PaymentRecord, PaymentRequestRecord, RateLimited,
};

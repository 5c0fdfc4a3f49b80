//! Payment-gated flow control over a swarm transfer engine.
//!
//! Serving peers pre-pay into a per-peer balance that is debited per
//! requested block; connections without enough balance are choked and asked
//! to pay. Downloading, we pay peers that ask, as long as they keep
//! delivering.
//!
//! # Components
//!
//! - [`PaymentEngine`] - Attaches payment handling to transfers and credits
//!   incoming settlements
//! - [`PaidClient`] - A [`TransferEngine`](tollgate_api::TransferEngine)
//!   whose transfers are attached automatically
//! - [`EngineEvent`] - Wallet readiness, payments and transfer completion
//!
//! # Lifecycle
//!
//! Transfers wait for the settlement client to be ready. Each new connection
//! is choked until its peer has paid; the payment handshake binds it to the
//! peer's identity and ledger account. A connection that closes is dropped
//! from the registry, while the peer's balance outlives it until
//! [`PaymentEngine::forget_peer`].

mod client;
mod connection;
mod engine;
mod events;
mod metrics;

pub use client::PaidClient;
pub use engine::{ENGINE_EVENT_CAPACITY, PaymentEngine};
pub use events::EngineEvent;

//! Per-peer credit balance.
//!
//! Each peer identity has one balance shared by every connection to it.
//! All modifications are atomic, so handlers for different connections can
//! charge and credit concurrently without locks.

use tollgate_primitives::{Amount, PeerIdentity};

use crate::atomic::AtomicAmount;

/// How much balance a charge requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sufficiency {
    /// The balance must be at least the charged amount.
    #[default]
    Covers,
    /// The balance must be strictly greater than the charged amount, so a
    /// charge never drains the balance to exactly zero.
    Exceeds,
}

impl Sufficiency {
    fn accepts(self, balance: Amount, amount: Amount) -> bool {
        match self {
            Sufficiency::Covers => balance >= amount,
            Sufficiency::Exceeds => balance > amount,
        }
    }
}

/// Result of a charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The amount was debited.
    Charged {
        /// Balance after the debit.
        remaining: Amount,
    },
    /// The balance was too low; nothing was debited.
    Insufficient {
        /// Balance at the time of the attempt.
        balance: Amount,
    },
}

impl ChargeOutcome {
    pub fn is_charged(&self) -> bool {
        matches!(self, ChargeOutcome::Charged { .. })
    }
}

/// Credit balance held for one remote peer.
///
/// # Balance Semantics
///
/// The balance is what the peer has pre-paid us and not yet spent. It is
/// unsigned and a charge is refused rather than applied if it would take
/// the balance below zero.
#[derive(Debug)]
pub struct PeerBalance {
    peer: PeerIdentity,
    balance: AtomicAmount,
}

impl PeerBalance {
    /// Create a zero balance for `peer`.
    pub fn new(peer: PeerIdentity) -> Self {
        Self {
            peer,
            balance: AtomicAmount::default(),
        }
    }

    /// The peer this balance belongs to.
    pub fn peer(&self) -> PeerIdentity {
        self.peer
    }

    /// Current balance.
    pub fn balance(&self) -> Amount {
        self.balance.load()
    }

    /// Debit `amount` if the balance is sufficient under `rule`.
    pub fn try_charge(&self, amount: Amount, rule: Sufficiency) -> ChargeOutcome {
        match self.balance.sub_if(amount, |balance| rule.accepts(balance, amount)) {
            Ok(remaining) => ChargeOutcome::Charged { remaining },
            Err(balance) => ChargeOutcome::Insufficient { balance },
        }
    }

    /// Add confirmed credit; returns the new balance.
    pub fn credit(&self, amount: Amount) -> Amount {
        self.balance.add(amount)
    }
}

//! Lock-free amount counters.

use portable_atomic::{AtomicU128, Ordering};
use tollgate_primitives::Amount;

/// An [`Amount`] that can be updated atomically from any task.
#[derive(Debug, Default)]
pub(crate) struct AtomicAmount(AtomicU128);

impl AtomicAmount {
    pub(crate) fn load(&self) -> Amount {
        Amount::from_units(self.0.load(Ordering::Acquire))
    }

    /// Saturating add; returns the new value.
    pub(crate) fn add(&self, amount: Amount) -> Amount {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |units| {
                Some(units.saturating_add(amount.units()))
            })
            .unwrap_or_else(|units| units);
        Amount::from_units(previous.saturating_add(amount.units()))
    }

    /// Saturating subtract; returns the new value.
    pub(crate) fn sub(&self, amount: Amount) -> Amount {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |units| {
                Some(units.saturating_sub(amount.units()))
            })
            .unwrap_or_else(|units| units);
        Amount::from_units(previous.saturating_sub(amount.units()))
    }

    /// Subtract `amount` only if `accept(current)` holds.
    ///
    /// The check and the debit are a single compare-and-swap, so concurrent
    /// callers can never both pass the check against the same value.
    /// Returns the new value on success, the unchanged value on refusal.
    pub(crate) fn sub_if(
        &self,
        amount: Amount,
        accept: impl Fn(Amount) -> bool,
    ) -> Result<Amount, Amount> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |units| {
                let current = Amount::from_units(units);
                if accept(current) {
                    units.checked_sub(amount.units())
                } else {
                    None
                }
            })
            .map(|previous| Amount::from_units(previous - amount.units()))
            .map_err(Amount::from_units)
    }
}

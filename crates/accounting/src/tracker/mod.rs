//! Delivery and spend tracking.
//!
//! Keeps, per (peer, transfer) pair, how many bytes the peer delivered to us
//! and how much we have paid it. The payment decider gates on these numbers:
//! cost-per-byte measures value actually received per unit paid, and the
//! recent-payment history drives the payment rate limit.
//!
//! # Queries
//!
//! All queries take a [`Filter`] selecting a peer, a transfer, or both:
//!
//! - [`total_sent`](DeliveryTracker::total_sent) - amount paid (reserved or committed)
//! - [`bytes_delivered`](DeliveryTracker::bytes_delivered) - bytes received
//! - [`cost_per_byte`](DeliveryTracker::cost_per_byte) - `total_sent / bytes_delivered`
//! - [`delivery_speed`](DeliveryTracker::delivery_speed) - bytes per second
//! - [`payments_within`](DeliveryTracker::payments_within) - payments in a trailing window

mod filter;
mod records;

pub use filter::Filter;
pub use records::{DeliveryRecord, PaymentRecord, PaymentRequestRecord};

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tollgate_primitives::{Amount, InfoHash, PaymentId, PeerIdentity};

use crate::AccountingError;

/// Payment requests remembered per pair for diagnostics.
const REQUEST_HISTORY: usize = 32;

#[derive(Debug, Default)]
struct PairStats {
    bytes_delivered: u64,
    first_delivery: Option<Instant>,
    last_delivery: Option<Instant>,
    total_sent: Amount,
    /// Submission times of payments still inside the history window.
    recent_payments: VecDeque<Instant>,
    payment_requests: u64,
    recent_requests: VecDeque<PaymentRequestRecord>,
}

#[derive(Debug, Default)]
struct TrackerState {
    pairs: HashMap<(PeerIdentity, InfoHash), PairStats>,
    in_flight: HashMap<PaymentId, PaymentRecord>,
}

impl TrackerState {
    fn matching<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a PairStats> + 'a {
        self.pairs
            .iter()
            .filter(move |((peer, torrent), _)| filter.matches(peer, torrent))
            .map(|(_, stats)| stats)
    }
}

/// Refusal from [`DeliveryTracker::reserve_within_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Payments already inside the window.
    pub recent: usize,
}

/// Per-(peer, transfer) delivery and spend history.
#[derive(Debug)]
pub struct DeliveryTracker {
    state: RwLock<TrackerState>,
    payment_history: Duration,
}

impl DeliveryTracker {
    /// Create a tracker remembering payment times for `payment_history`.
    pub fn new(payment_history: Duration) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            payment_history,
        }
    }

    /// Record bytes received from a peer.
    pub fn record_delivery(&self, delivery: DeliveryRecord) {
        let mut state = self.state.write();
        let stats = state.pairs.entry((delivery.peer, delivery.torrent)).or_default();
        stats.bytes_delivered = stats.bytes_delivered.saturating_add(delivery.bytes);
        stats.first_delivery.get_or_insert(delivery.at);
        stats.last_delivery = Some(delivery.at);
    }

    /// Log a payment request before it is decided on.
    pub fn record_payment_request(&self, request: PaymentRequestRecord) {
        let mut state = self.state.write();
        let stats = state.pairs.entry((request.peer, request.torrent)).or_default();
        stats.payment_requests += 1;
        if stats.recent_requests.len() == REQUEST_HISTORY {
            stats.recent_requests.pop_front();
        }
        stats.recent_requests.push_back(request);
    }

    /// Record a payment optimistically if fewer than `max` payments to the
    /// same pair fall inside the trailing `window`.
    ///
    /// The limit check and the insert happen under one lock.
    pub(crate) fn reserve_within_limit(
        &self,
        payment: PaymentRecord,
        window: Duration,
        max: usize,
    ) -> Result<(), RateLimited> {
        let mut state = self.state.write();
        let stats = state.pairs.entry((payment.peer, payment.torrent)).or_default();

        prune_before(&mut stats.recent_payments, payment.at, self.payment_history.max(window));
        let recent = count_within(&stats.recent_payments, payment.at, window);
        if recent >= max {
            return Err(RateLimited { recent });
        }

        stats.total_sent += payment.amount;
        stats.recent_payments.push_back(payment.at);
        state.in_flight.insert(payment.id, payment);
        Ok(())
    }

    /// Mark an in-flight payment as settled; its amounts stay counted.
    pub(crate) fn commit(&self, id: PaymentId) -> Result<PaymentRecord, AccountingError> {
        self.state.write().in_flight.remove(&id).ok_or(AccountingError::UnknownPayment(id))
    }

    /// Undo exactly what [`reserve_within_limit`](Self::reserve_within_limit) added.
    pub(crate) fn rollback(&self, id: PaymentId) -> Result<PaymentRecord, AccountingError> {
        let mut state = self.state.write();
        let payment = state.in_flight.remove(&id).ok_or(AccountingError::UnknownPayment(id))?;

        if let Some(stats) = state.pairs.get_mut(&(payment.peer, payment.torrent)) {
            stats.total_sent = stats.total_sent.saturating_sub(payment.amount);
            if let Some(pos) = stats.recent_payments.iter().rposition(|at| *at == payment.at) {
                stats.recent_payments.remove(pos);
            }
        }
        Ok(payment)
    }

    /// Total paid (including in-flight payments).
    pub fn total_sent(&self, filter: Filter) -> Amount {
        self.state.read().matching(&filter).map(|s| s.total_sent).sum()
    }

    /// Total bytes delivered to us.
    pub fn bytes_delivered(&self, filter: Filter) -> u64 {
        self.state
            .read()
            .matching(&filter)
            .fold(0u64, |total, s| total.saturating_add(s.bytes_delivered))
    }

    /// Amount paid per byte received, in whole currency units.
    ///
    /// Zero when nothing was paid; infinite when something was paid but no
    /// bytes have arrived.
    pub fn cost_per_byte(&self, filter: Filter) -> f64 {
        let state = self.state.read();
        let (sent, bytes) = state.matching(&filter).fold((Amount::ZERO, 0u64), |(sent, bytes), s| {
            (sent + s.total_sent, bytes.saturating_add(s.bytes_delivered))
        });
        if sent.is_zero() {
            return 0.0;
        }
        if bytes == 0 {
            return f64::INFINITY;
        }
        sent.as_f64() / bytes as f64
    }

    /// Bytes per second from the first recorded delivery to the last one,
    /// or to `now` when `include_time_to_now` is set.
    ///
    /// Zero until a measurable interval has elapsed.
    pub fn delivery_speed(&self, filter: Filter, include_time_to_now: bool, now: Instant) -> f64 {
        let state = self.state.read();
        let mut bytes = 0u64;
        let mut first: Option<Instant> = None;
        let mut last: Option<Instant> = None;
        for stats in state.matching(&filter) {
            bytes = bytes.saturating_add(stats.bytes_delivered);
            first = earliest(first, stats.first_delivery);
            last = latest(last, stats.last_delivery);
        }

        let Some(first) = first else {
            return 0.0;
        };
        let end = if include_time_to_now { now } else { last.unwrap_or(first) };
        let elapsed = end.saturating_duration_since(first).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        bytes as f64 / elapsed
    }

    /// Payments made within the trailing `window` ending at `now`.
    pub fn payments_within(&self, filter: Filter, window: Duration, now: Instant) -> usize {
        self.state
            .read()
            .matching(&filter)
            .map(|s| count_within(&s.recent_payments, now, window))
            .sum()
    }

    /// Number of payment requests received.
    pub fn payment_requests(&self, filter: Filter) -> u64 {
        self.state.read().matching(&filter).map(|s| s.payment_requests).sum()
    }

    /// Most recent payment request matching `filter`.
    pub fn last_payment_request(&self, filter: Filter) -> Option<PaymentRequestRecord> {
        self.state
            .read()
            .matching(&filter)
            .filter_map(|s| s.recent_requests.back())
            .max_by_key(|r| r.at)
            .cloned()
    }

    /// Payments submitted but not yet settled.
    pub fn in_flight(&self, filter: Filter) -> Vec<PaymentRecord> {
        self.state
            .read()
            .in_flight
            .values()
            .filter(|p| filter.matches(&p.peer, &p.torrent))
            .cloned()
            .collect()
    }

    /// Drop all history matching `filter`, except payments still in flight.
    pub fn forget(&self, filter: Filter) {
        let mut state = self.state.write();
        let TrackerState { pairs, in_flight } = &mut *state;
        pairs.retain(|(peer, torrent), _| {
            !filter.matches(peer, torrent)
                || in_flight.values().any(|p| p.peer == *peer && p.torrent == *torrent)
        });
    }
}

fn count_within(times: &VecDeque<Instant>, now: Instant, window: Duration) -> usize {
    times.iter().filter(|at| now.saturating_duration_since(**at) < window).count()
}

fn prune_before(times: &mut VecDeque<Instant>, now: Instant, keep: Duration) {
    while times.front().is_some_and(|at| now.saturating_duration_since(*at) >= keep) {
        times.pop_front();
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

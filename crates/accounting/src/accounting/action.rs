//! Two-phase payment reservations.
//!
//! A reservation represents an outgoing payment that has been counted
//! optimistically but not yet settled. It must be either committed (the
//! ledger accepted the payment) or rolled back (the submission failed); a
//! reservation dropped without either is rolled back.

use std::sync::Arc;

use tollgate_primitives::{Amount, InfoHash, PaymentId, PeerIdentity};
use tracing::{debug, warn};

use crate::{DeliveryTracker, PaymentRecord, TorrentEconomics};

/// An optimistically recorded outgoing payment.
///
/// While held, the amount is included in the tracker's `total_sent` and in
/// the transfer's `total_spent`. Rolling back subtracts exactly that amount.
#[must_use = "a dropped reservation is rolled back"]
pub struct PaymentReservation {
    record: PaymentRecord,
    tracker: Arc<DeliveryTracker>,
    torrent: Arc<TorrentEconomics>,
    settled: bool,
}

impl PaymentReservation {
    pub(crate) fn new(
        record: PaymentRecord,
        tracker: Arc<DeliveryTracker>,
        torrent: Arc<TorrentEconomics>,
    ) -> Self {
        torrent.add_spent(record.peer, record.amount);
        Self { record, tracker, torrent, settled: false }
    }

    /// Identifier carried in the payment memo.
    pub fn id(&self) -> PaymentId {
        self.record.id
    }

    /// Peer being paid.
    pub fn peer(&self) -> PeerIdentity {
        self.record.peer
    }

    /// Transfer the payment is spent on.
    pub fn torrent(&self) -> InfoHash {
        self.record.torrent
    }

    /// Reserved amount.
    pub fn amount(&self) -> Amount {
        self.record.amount
    }

    /// In-flight record held by the tracker until commit or rollback.
    pub fn record(&self) -> &PaymentRecord {
        &self.record
    }

    /// The payment settled; keep the amounts counted.
    pub fn commit(mut self) {
        self.settled = true;
        if let Err(e) = self.tracker.commit(self.record.id) {
            warn!(id = %self.record.id, error = %e, "Committing unknown payment");
        }
    }

    /// The payment failed; remove exactly what was reserved.
    pub fn rollback(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;

        match self.tracker.rollback(self.record.id) {
            Ok(record) => {
                self.torrent.remove_spent(record.peer, record.amount);
                debug!(
                    id = %record.id,
                    peer = %record.peer.short(),
                    amount = %record.amount,
                    "Rolled back payment"
                );
            }
            Err(e) => warn!(id = %self.record.id, error = %e, "Rolling back unknown payment"),
        }
    }
}

impl Drop for PaymentReservation {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PaymentReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentReservation")
            .field("record", &self.record)
            .field("settled", &self.settled)
            .finish()
    }
}

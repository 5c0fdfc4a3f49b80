//! Connections that completed the payment handshake.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tollgate_accounting::PeerBalance;
use tollgate_api::Wire;
use tollgate_policy::Bid;
use tollgate_primitives::{AccountId, Amount, ConnectionId, InfoHash, PeerIdentity};

/// A handshaken connection and its payment state.
pub(crate) struct Connection {
    pub(crate) wire: Arc<dyn Wire>,
    pub(crate) peer: PeerIdentity,
    /// Account the peer wants to be paid on.
    pub(crate) account: AccountId,
    pub(crate) info_hash: InfoHash,
    /// Shared with every other connection to the same peer.
    pub(crate) balance: Arc<PeerBalance>,
    pub(crate) bid: Bid,
}

impl Connection {
    pub(crate) fn id(&self) -> ConnectionId {
        self.wire.id()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("peer", &self.peer.short())
            .field("account", &self.account)
            .field("info_hash", &self.info_hash)
            .field("bid", &self.bid.amount())
            .finish_non_exhaustive()
    }
}

/// Handshaken connections grouped by peer.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    peers: DashMap<PeerIdentity, Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Register the connection built by `connect`.
    ///
    /// `connect` runs while the peer's entry is locked, so state it resolves
    /// for the peer cannot be forgotten before the connection is registered.
    pub(crate) fn register_with(
        &self,
        peer: PeerIdentity,
        connect: impl FnOnce() -> Arc<Connection>,
    ) -> Arc<Connection> {
        let mut connections = self.peers.entry(peer).or_default();
        let connection = connect();
        connections.push(Arc::clone(&connection));
        connection
    }

    /// Remove a connection; returns whether it was registered.
    pub(crate) fn remove(&self, peer: &PeerIdentity, id: ConnectionId) -> bool {
        let mut removed = false;
        if let Some(mut connections) = self.peers.get_mut(peer) {
            let before = connections.len();
            connections.retain(|connection| connection.id() != id);
            removed = connections.len() != before;
        }
        self.peers.remove_if(peer, |_, connections| connections.is_empty());
        removed
    }

    /// Snapshot of a peer's connections.
    pub(crate) fn of(&self, peer: &PeerIdentity) -> Vec<Arc<Connection>> {
        self.peers.get(peer).map(|connections| connections.clone()).unwrap_or_default()
    }

    /// Run `forget` if `peer` has no connections; returns whether it ran.
    ///
    /// Registrations for the peer wait until `forget` returns.
    pub(crate) fn forget_if_idle(&self, peer: &PeerIdentity, forget: impl FnOnce()) -> bool {
        match self.peers.entry(*peer) {
            Entry::Occupied(_) => false,
            Entry::Vacant(_locked) => {
                forget();
                true
            }
        }
    }

    pub(crate) fn bids_of(&self, peer: &PeerIdentity) -> Vec<(ConnectionId, Amount)> {
        self.of(peer).iter().map(|connection| (connection.id(), connection.bid.amount())).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tollgate_accounting::Accounting;
    use tollgate_policy::{BidController, DefaultPaymentConfig};
    use tollgate_test_utils::{MockWire, test_info_hash, test_peer};

    fn connection_with(peer: PeerIdentity, balance: Arc<PeerBalance>) -> Arc<Connection> {
        Arc::new(Connection {
            wire: MockWire::new(),
            peer,
            account: AccountId::new("peer"),
            info_hash: test_info_hash(1),
            balance,
            bid: BidController::from_config(&DefaultPaymentConfig).open(),
        })
    }

    fn register(registry: &ConnectionRegistry, peer: PeerIdentity) -> Arc<Connection> {
        registry.register_with(peer, || connection_with(peer, Arc::new(PeerBalance::new(peer))))
    }

    #[test]
    fn test_registry_groups_by_peer() {
        let registry = ConnectionRegistry::default();
        let first = register(&registry, test_peer(1));
        let second = register(&registry, test_peer(1));
        register(&registry, test_peer(2));

        assert_eq!(registry.of(&test_peer(1)).len(), 2);
        assert_eq!(registry.len(), 3);

        assert!(registry.remove(&test_peer(1), first.id()));
        assert!(!registry.remove(&test_peer(1), first.id()));
        assert_eq!(registry.of(&test_peer(1)).len(), 1);

        assert!(registry.remove(&test_peer(1), second.id()));
        assert!(registry.of(&test_peer(1)).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_forget_only_idle_peers() {
        let registry = ConnectionRegistry::default();
        let connection = register(&registry, test_peer(1));

        let mut forgotten = false;
        assert!(!registry.forget_if_idle(&test_peer(1), || forgotten = true));
        assert!(!forgotten);

        registry.remove(&test_peer(1), connection.id());
        assert!(registry.forget_if_idle(&test_peer(1), || forgotten = true));
        assert!(forgotten);
        assert!(registry.of(&test_peer(1)).is_empty());
    }

    /// A registration racing with forgets must end up holding the balance
    /// accounting still knows, never a discarded one.
    #[test]
    fn test_registration_racing_forget_keeps_live_balance() {
        let peer = test_peer(1);

        for _ in 0..50 {
            let accounting = Arc::new(Accounting::new(Duration::from_secs(5)));
            let registry = Arc::new(ConnectionRegistry::default());

            let forgetting = {
                let accounting = Arc::clone(&accounting);
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        registry.forget_if_idle(&peer, || accounting.forget_peer(&peer));
                    }
                })
            };
            let registered = registry
                .register_with(peer, || connection_with(peer, accounting.get_or_create_peer(peer)));
            forgetting.join().unwrap();

            assert!(Arc::ptr_eq(&registered.balance, &accounting.get_or_create_peer(peer)));
        }
    }
}

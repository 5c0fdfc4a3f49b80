//! Composable query filters.

use tollgate_primitives::{InfoHash, PeerIdentity};

/// Selects tracker history by peer, by transfer, or both.
///
/// The default filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    pub peer: Option<PeerIdentity>,
    pub torrent: Option<InfoHash>,
}

impl Filter {
    pub fn peer(peer: PeerIdentity) -> Self {
        Self { peer: Some(peer), torrent: None }
    }

    pub fn torrent(torrent: InfoHash) -> Self {
        Self { peer: None, torrent: Some(torrent) }
    }

    pub fn pair(peer: PeerIdentity, torrent: InfoHash) -> Self {
        Self { peer: Some(peer), torrent: Some(torrent) }
    }

    pub(crate) fn matches(&self, peer: &PeerIdentity, torrent: &InfoHash) -> bool {
        self.peer.is_none_or(|p| &p == peer) && self.torrent.is_none_or(|t| &t == torrent)
    }
}

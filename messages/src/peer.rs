//! What the masternode layer needs from the peer-to-peer transport.

use mx_types::NetAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::MxMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer={}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: NetAddress,
    pub protocol_version: u32,
}

/// Connected peers, message delivery and ban scoring.
///
/// Implementations must not block: sends are queued, not awaited.
pub trait PeerTransport: Send + Sync {
    fn peers(&self) -> Vec<PeerInfo>;

    fn peer(&self, id: PeerId) -> Option<PeerInfo> {
        self.peers().into_iter().find(|p| p.id == id)
    }

    fn send(&self, peer: PeerId, message: MxMessage);

    /// Send to every connected peer.
    fn relay(&self, message: MxMessage);

    /// Add `score` to the peer's ban score.
    fn misbehaving(&self, peer: PeerId, score: u32);

    /// Per-peer flag recording that we already asked this peer for `request`.
    fn has_fulfilled(&self, peer: PeerId, request: &str) -> bool;
    fn fulfill(&self, peer: PeerId, request: &str);
    fn clear_fulfilled(&self, peer: PeerId, request: &str);
}

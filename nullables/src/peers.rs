//! Nullable peers: record messages instead of sending them.

use mx_messages::{MxMessage, PeerId, PeerInfo, PeerTransport};
use mx_types::NetAddress;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct PeersState {
    next_id: u64,
    peers: Vec<PeerInfo>,
    sent: Vec<(PeerId, MxMessage)>,
    relayed: Vec<MxMessage>,
    misbehavior: HashMap<PeerId, u32>,
    fulfilled: HashSet<(PeerId, String)>,
}

/// A test transport that records every send, relay and ban score.
#[derive(Default)]
pub struct NullPeers {
    state: Mutex<PeersState>,
}

impl NullPeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a peer and return its id.
    pub fn connect(&self, addr: &str, protocol_version: u32) -> PeerId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = PeerId(state.next_id);
        let addr: NetAddress = addr.parse().unwrap_or_default();
        state.peers.push(PeerInfo {
            id,
            addr,
            protocol_version,
        });
        id
    }

    pub fn disconnect(&self, id: PeerId) {
        self.state.lock().unwrap().peers.retain(|p| p.id != id);
    }

    /// Messages sent directly to `peer`.
    pub fn sent_to(&self, peer: PeerId) -> Vec<MxMessage> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(p, _)| *p == peer)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn relayed(&self) -> Vec<MxMessage> {
        self.state.lock().unwrap().relayed.clone()
    }

    /// Accumulated ban score of `peer`.
    pub fn misbehavior(&self, peer: PeerId) -> u32 {
        self.state
            .lock()
            .unwrap()
            .misbehavior
            .get(&peer)
            .copied()
            .unwrap_or(0)
    }

    /// Forget recorded traffic; peers and flags stay.
    pub fn clear_traffic(&self) {
        let mut state = self.state.lock().unwrap();
        state.sent.clear();
        state.relayed.clear();
    }
}

impl PeerTransport for NullPeers {
    fn peers(&self) -> Vec<PeerInfo> {
        self.state.lock().unwrap().peers.clone()
    }

    fn send(&self, peer: PeerId, message: MxMessage) {
        self.state.lock().unwrap().sent.push((peer, message));
    }

    fn relay(&self, message: MxMessage) {
        self.state.lock().unwrap().relayed.push(message);
    }

    fn misbehaving(&self, peer: PeerId, score: u32) {
        *self.state.lock().unwrap().misbehavior.entry(peer).or_default() += score;
    }

    fn has_fulfilled(&self, peer: PeerId, request: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .fulfilled
            .contains(&(peer, request.to_string()))
    }

    fn fulfill(&self, peer: PeerId, request: &str) {
        self.state
            .lock()
            .unwrap()
            .fulfilled
            .insert((peer, request.to_string()));
    }

    fn clear_fulfilled(&self, peer: PeerId, request: &str) {
        self.state
            .lock()
            .unwrap()
            .fulfilled
            .remove(&(peer, request.to_string()));
    }
}

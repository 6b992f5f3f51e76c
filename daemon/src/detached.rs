//! Collaborators for running the service outside a full node.
//!
//! A detached daemon has no blockchain engine and no P2P transport. The
//! chain reports no tip, so the sync machine never leaves its first stage
//! and the registry is served from the cache file only.

use mx_messages::{MxMessage, PeerId, PeerInfo, PeerTransport};
use mx_types::{ChainBusy, ChainOracle, ChainTip, Hash256, Outpoint, Timestamp, TxOut, UtxoStatus};

pub struct DetachedChain;

impl ChainOracle for DetachedChain {
    fn tip(&self) -> Option<ChainTip> {
        None
    }

    fn block_hash(&self, _height: u64) -> Option<Hash256> {
        None
    }

    fn block_time(&self, _height: u64) -> Option<Timestamp> {
        None
    }

    fn height_of(&self, _hash: &Hash256) -> Option<u64> {
        None
    }

    fn collateral_output(&self, _outpoint: &Outpoint) -> Option<TxOut> {
        None
    }

    /// Unknown, which callers treat like a contended chain lock.
    fn utxo_status(&self, _outpoint: &Outpoint) -> Result<UtxoStatus, ChainBusy> {
        Err(ChainBusy)
    }

    fn is_importing(&self) -> bool {
        false
    }

    fn block_value(&self, _height: u64, fees: u64) -> u64 {
        fees
    }

    fn masternode_payment(&self, _height: u64, _block_value: u64) -> u64 {
        0
    }
}

/// A transport with no connections. Outgoing messages are logged and dropped.
pub struct DetachedPeers;

impl PeerTransport for DetachedPeers {
    fn peers(&self) -> Vec<PeerInfo> {
        Vec::new()
    }

    fn send(&self, peer: PeerId, message: MxMessage) {
        tracing::trace!(%peer, command = message.command(), "no transport, message dropped");
    }

    fn relay(&self, message: MxMessage) {
        tracing::trace!(command = message.command(), "no transport, relay dropped");
    }

    fn misbehaving(&self, _peer: PeerId, _score: u32) {}

    fn has_fulfilled(&self, _peer: PeerId, _request: &str) -> bool {
        false
    }

    fn fulfill(&self, _peer: PeerId, _request: &str) {}

    fn clear_fulfilled(&self, _peer: PeerId, _request: &str) {}
}

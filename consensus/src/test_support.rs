//! Fixtures shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mx_crypto::{hash_parts, keypair_from_seed, payee_script};
use mx_masternode::{AnnounceOutcome, Registry, RegistryConfig, SyncProgress};
use mx_messages::{Announce, PaymentVote, PeerInfo, PeerTransport};
use mx_nullables::{NullChain, NullClock, NullPeers, NullSporks};
use mx_types::params::{MASTERNODE_COLLATERAL, PING_ANCHOR_DEPTH, PROTOCOL_VERSION};
use mx_types::{ChainOracle, Hash256, KeyPair, NetworkId, Outpoint, Script, TxOut};

use crate::payments::Payments;

pub const NOW: u64 = 1_700_000_000;
pub const BLOCKS: u64 = 200;
pub const SPACING: u64 = 60;

#[derive(Default)]
pub struct RecordingSync {
    pub winners: Mutex<HashSet<Hash256>>,
    pub synced: AtomicBool,
    pub blockchain_synced: AtomicBool,
}

impl SyncProgress for RecordingSync {
    fn added_list_entry(&self, _hash: Hash256) {}
    fn forget_list_entry(&self, _hash: &Hash256) {}

    fn added_winner(&self, hash: Hash256) {
        self.winners.lock().unwrap().insert(hash);
    }

    fn forget_winner(&self, hash: &Hash256) {
        self.winners.lock().unwrap().remove(hash);
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn is_blockchain_synced(&self) -> bool {
        self.blockchain_synced.load(Ordering::SeqCst)
    }
}

pub struct TestNode {
    pub seed: u8,
    pub collateral: KeyPair,
    pub operational: KeyPair,
    pub outpoint: Outpoint,
}

impl TestNode {
    pub fn payee(&self) -> Script {
        payee_script(&self.collateral.public)
    }
}

pub struct Harness {
    pub chain: Arc<NullChain>,
    pub clock: Arc<NullClock>,
    pub sporks: Arc<NullSporks>,
    pub peers: Arc<NullPeers>,
    pub sync: Arc<RecordingSync>,
    pub registry: Arc<Registry>,
    pub payments: Arc<Payments>,
}

impl Harness {
    pub fn new(network: NetworkId) -> Self {
        Self::with_blocks(network, BLOCKS)
    }

    /// A chain of `blocks` blocks whose tip was mined a minute before [`NOW`].
    pub fn with_blocks(network: NetworkId, blocks: u64) -> Self {
        let chain = Arc::new(NullChain::with_blocks(blocks, NOW - blocks * SPACING, SPACING));
        let clock = Arc::new(NullClock::new(NOW));
        let sporks = Arc::new(NullSporks::new());
        let peers = Arc::new(NullPeers::new());
        let sync = Arc::new(RecordingSync::default());
        sync.blockchain_synced.store(true, Ordering::SeqCst);
        let registry = Arc::new(Registry::new(
            RegistryConfig::new(network),
            chain.clone(),
            sporks.clone(),
            clock.clone(),
            peers.clone(),
            sync.clone(),
        ));
        let payments = Arc::new(Payments::new(
            registry.clone(),
            chain.clone(),
            sporks.clone(),
            peers.clone(),
            sync.clone(),
        ));
        Self {
            chain,
            clock,
            sporks,
            peers,
            sync,
            registry,
            payments,
        }
    }

    pub fn script(&self, byte: u8) -> Script {
        Script::pay_to_key_id(&[byte; 20])
    }

    pub fn peer(&self, protocol_version: u32) -> PeerInfo {
        let id = self.peers.connect("198.51.100.7:9667", protocol_version);
        self.peers.peer(id).unwrap()
    }

    /// Keys and a collateral output confirmed at height 10.
    pub fn node(&self, seed: u8) -> TestNode {
        let collateral = keypair_from_seed(&[seed; 32]);
        let operational = keypair_from_seed(&[seed.wrapping_add(100); 32]);
        let outpoint = Outpoint::new(hash_parts(&[b"collateral", &[seed]]), 0);
        self.chain.add_collateral(
            outpoint,
            TxOut::new(MASTERNODE_COLLATERAL, payee_script(&collateral.public)),
            Some(10),
        );
        TestNode {
            seed,
            collateral,
            operational,
            outpoint,
        }
    }

    /// Register masternodes seeded `1..=count`.
    pub fn register_many(&self, count: u8) -> Vec<TestNode> {
        let port = self.registry.network().default_port();
        let tip = self.chain.tip().unwrap();
        let anchor = self.chain.block_hash(tip.height - PING_ANCHOR_DEPTH).unwrap();
        (1..=count)
            .map(|seed| {
                let node = self.node(seed);
                let announce = Announce::signed(
                    node.outpoint,
                    format!("203.0.113.{seed}:{port}").parse().unwrap(),
                    &node.collateral,
                    &node.operational,
                    PROTOCOL_VERSION,
                    anchor,
                    self.clock.now(),
                );
                let outcome = self.registry.handle_announce(None, &announce).unwrap();
                assert!(matches!(outcome, AnnounceOutcome::Added { .. }));
                node
            })
            .collect()
    }

    /// A vote from a voter outside the registry, as stored by `add_winning_vote`.
    pub fn unsigned_vote(&self, seed: u8, height: u64, payee: Script) -> PaymentVote {
        let voter = Outpoint::new(hash_parts(&[b"voter", &[seed]]), 0);
        PaymentVote::new(voter, height, payee)
    }

    pub fn signed_vote(&self, node: &TestNode, height: u64, payee: Script) -> PaymentVote {
        let mut vote = PaymentVote::new(node.outpoint, height, payee);
        vote.sign(&node.operational);
        vote
    }
}

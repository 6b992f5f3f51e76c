//! Fixtures shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mx_crypto::{hash_parts, keypair_from_seed, payee_script};
use mx_messages::{Announce, Ping};
use mx_nullables::{NullChain, NullClock, NullPeers, NullSporks};
use mx_types::params::{MASTERNODE_COLLATERAL, PING_ANCHOR_DEPTH, PROTOCOL_VERSION};
use mx_types::{ChainOracle, Hash256, KeyPair, NetAddress, NetworkId, Outpoint, Script, Timestamp, TxOut};

use crate::collaborators::{PaymentSchedule, SyncProgress};
use crate::registry::{AnnounceOutcome, Registry, RegistryConfig};

pub const NOW: u64 = 1_700_000_000;
pub const BLOCKS: u64 = 200;
pub const SPACING: u64 = 60;

/// Records what the registry reports to the sync machine.
#[derive(Default)]
pub struct RecordingSync {
    pub list: Mutex<HashSet<Hash256>>,
    pub winners: Mutex<HashSet<Hash256>>,
    pub synced: AtomicBool,
    pub blockchain_synced: AtomicBool,
}

impl SyncProgress for RecordingSync {
    fn added_list_entry(&self, hash: Hash256) {
        self.list.lock().unwrap().insert(hash);
    }

    fn forget_list_entry(&self, hash: &Hash256) {
        self.list.lock().unwrap().remove(hash);
    }

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

/// Payment tallies reduced to what queue selection asks.
#[derive(Default)]
pub struct StubSchedule {
    pub scheduled: Mutex<HashSet<Script>>,
    pub votes: Mutex<HashMap<(u64, Script), u32>>,
}

impl PaymentSchedule for StubSchedule {
    fn is_scheduled(&self, payee: &Script, _not_height: u64) -> bool {
        self.scheduled.lock().unwrap().contains(payee)
    }

    fn has_payee_with_votes(&self, height: u64, payee: &Script, votes: u32) -> bool {
        self.votes
            .lock()
            .unwrap()
            .get(&(height, payee.clone()))
            .is_some_and(|v| *v >= votes)
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
}

impl Harness {
    pub fn new(network: NetworkId) -> Self {
        Self::with_config(RegistryConfig::new(network))
    }

    /// A chain of [`BLOCKS`] blocks whose tip was mined a minute before [`NOW`].
    pub fn with_config(config: RegistryConfig) -> Self {
        let chain = Arc::new(NullChain::with_blocks(BLOCKS, NOW - BLOCKS * SPACING, SPACING));
        let clock = Arc::new(NullClock::new(NOW));
        let sporks = Arc::new(NullSporks::new());
        let peers = Arc::new(NullPeers::new());
        let sync = Arc::new(RecordingSync::default());
        sync.blockchain_synced.store(true, Ordering::SeqCst);
        let registry = Arc::new(Registry::new(
            config,
            chain.clone(),
            sporks.clone(),
            clock.clone(),
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
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
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

    pub fn addr(&self, node: &TestNode) -> NetAddress {
        let port = self.registry.network().default_port();
        format!("203.0.113.{}:{port}", node.seed)
            .parse()
            .unwrap()
    }

    pub fn anchor(&self) -> Hash256 {
        let tip = self.chain.tip().unwrap();
        self.chain.block_hash(tip.height - PING_ANCHOR_DEPTH).unwrap()
    }

    pub fn announce(&self, node: &TestNode, sig_time: Timestamp) -> Announce {
        Announce::signed(
            node.outpoint,
            self.addr(node),
            &node.collateral,
            &node.operational,
            PROTOCOL_VERSION,
            self.anchor(),
            sig_time,
        )
    }

    pub fn ping(&self, node: &TestNode, sig_time: Timestamp) -> Ping {
        Ping::signed(node.outpoint, self.anchor(), sig_time, &node.operational)
    }

    /// Announce `node` now and assert it was admitted.
    pub fn register(&self, node: &TestNode) -> Announce {
        let announce = self.announce(node, self.now());
        let outcome = self.registry.handle_announce(None, &announce).unwrap();
        assert!(matches!(outcome, AnnounceOutcome::Added { .. }));
        announce
    }
}

//! Payment consensus.
//!
//! The top-ranked masternodes vote on who gets paid at each upcoming height.
//! Votes are tallied per height; once a payee reaches
//! [`SIGNATURES_REQUIRED`] the coinbase of that block must pay it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mx_masternode::{anchor_hash, PaymentSchedule, Registry, SyncProgress};
use mx_messages::{MxMessage, PaymentVote, PeerId, PeerInfo, PeerTransport, Rejection, SyncAsset};
use mx_store::{DumpOutcome, FlatFileStore, ReadResult};
use mx_types::params::{
    MIN_WINNER_PEER_PROTO, REFERENCE_NODE_WEIGHT, SCHEDULE_LOOKAHEAD, SCORE_LOOKBACK,
    SIGNATURES_TOTAL,
};
use mx_types::{
    ChainOracle, CoinbaseTx, Hash256, KeyPair, NetworkId, Outpoint, Script, Spork, Sporks, TxOut,
};
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;
use crate::tally::BlockPayees;

/// Magic message of the payment cache file.
pub const PAYMENTS_CACHE_MAGIC: &str = "MasterXPayments";

/// File name of the payment cache inside the data directory.
pub const PAYMENTS_CACHE_FILE: &str = "mnpayments.dat";

/// Request key recorded per peer once it asked us for the vote table.
const PAYMENT_SYNC_REQUEST: &str = "mnget";

const MISBEHAVIOR_SCORE: u32 = 20;

pub fn payments_cache(data_dir: &Path, network: NetworkId) -> FlatFileStore {
    FlatFileStore::new(
        data_dir.join(PAYMENTS_CACHE_FILE),
        PAYMENTS_CACHE_MAGIC,
        network.magic(),
    )
}

/// Votes by hash and tallies by height. This is also the cache file payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentTables {
    pub votes: HashMap<Hash256, PaymentVote>,
    pub blocks: BTreeMap<u64, BlockPayees>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted,
    AlreadySeen,
}

pub struct Payments {
    registry: Arc<Registry>,
    chain: Arc<dyn ChainOracle>,
    sporks: Arc<dyn Sporks>,
    peers: Arc<dyn PeerTransport>,
    sync: Arc<dyn SyncProgress>,
    tables: Mutex<PaymentTables>,
    /// Heights each voter has voted for, within the retained history.
    voted_heights: Mutex<HashMap<Outpoint, BTreeSet<u64>>>,
    /// Last height we voted for ourselves.
    last_block_height: AtomicU64,
}

impl Payments {
    pub fn new(
        registry: Arc<Registry>,
        chain: Arc<dyn ChainOracle>,
        sporks: Arc<dyn Sporks>,
        peers: Arc<dyn PeerTransport>,
        sync: Arc<dyn SyncProgress>,
    ) -> Self {
        Self {
            registry,
            chain,
            sporks,
            peers,
            sync,
            tables: Mutex::new(PaymentTables::default()),
            voted_heights: Mutex::new(HashMap::new()),
            last_block_height: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaymentTables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn network(&self) -> NetworkId {
        self.registry.network()
    }

    // ── Tally queries ───────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.lock().votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }

    pub fn has_vote(&self, hash: &Hash256) -> bool {
        self.lock().votes.contains_key(hash)
    }

    pub fn vote(&self, hash: &Hash256) -> Option<PaymentVote> {
        self.lock().votes.get(hash).cloned()
    }

    pub fn tally(&self, height: u64) -> Option<BlockPayees> {
        self.lock().blocks.get(&height).cloned()
    }

    /// Most-voted payee at `height`.
    pub fn block_payee(&self, height: u64) -> Option<Script> {
        self.lock().blocks.get(&height)?.payee().cloned()
    }

    /// `"script:votes, ..."` for `height`, or `"Unknown"` when nobody voted.
    pub fn required_payments_string(&self, height: u64) -> String {
        match self.lock().blocks.get(&height) {
            Some(block) => block.required_payments_string(),
            None => "Unknown".to_string(),
        }
    }

    pub fn oldest_block(&self) -> Option<u64> {
        self.lock().blocks.keys().next().copied()
    }

    pub fn newest_block(&self) -> Option<u64> {
        self.lock().blocks.keys().next_back().copied()
    }

    pub fn last_block_height(&self) -> u64 {
        self.last_block_height.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        *self.lock() = PaymentTables::default();
        self.voted_heights
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let tables = self.lock();
        format!("Votes: {}, Blocks: {}", tables.votes.len(), tables.blocks.len())
    }

    // ── Recording votes ─────────────────────────────────────────────────

    /// Record that `voter` voted for `height`. False if it already did.
    pub fn can_vote(&self, voter: Outpoint, height: u64) -> bool {
        let mut voted = self.voted_heights.lock().unwrap_or_else(|e| e.into_inner());
        voted.entry(voter).or_default().insert(height)
    }

    /// Store a vote and add it to the height's tally.
    ///
    /// Fails on a duplicate or when the block the voter ranks were taken
    /// at is not known yet.
    pub fn add_winning_vote(&self, vote: &PaymentVote) -> bool {
        let anchored = vote
            .height
            .checked_sub(SCORE_LOOKBACK)
            .and_then(|h| anchor_hash(self.chain.as_ref(), h))
            .is_some();
        if !anchored {
            return false;
        }

        let hash = vote.hash();
        let mut tables = self.lock();
        if tables.votes.contains_key(&hash) {
            return false;
        }
        tables.votes.insert(hash, vote.clone());

        let weight = if self.network().is_reference_node(&vote.voter) {
            REFERENCE_NODE_WEIGHT
        } else {
            1
        };
        tables
            .blocks
            .entry(vote.height)
            .or_insert_with(|| BlockPayees::new(vote.height))
            .add_payee(vote.payee.clone(), weight);
        true
    }

    // ── Network handlers ────────────────────────────────────────────────

    /// Handle a `mnw` payment vote from `from`.
    pub fn handle_vote(&self, from: &PeerInfo, vote: &PaymentVote) -> Result<VoteOutcome, Rejection> {
        let result = self.check_vote(from, vote);
        match &result {
            Err(rejection) if rejection.is_misbehavior() => {
                self.peers.misbehaving(from.id, rejection.dos);
                tracing::debug!(peer = %from.addr, voter = %vote.voter, height = vote.height, %rejection, "payment vote rejected");
            }
            Err(rejection) => {
                tracing::trace!(peer = %from.addr, voter = %vote.voter, height = vote.height, %rejection, "payment vote dropped");
            }
            Ok(_) => {}
        }
        result
    }

    fn check_vote(&self, from: &PeerInfo, vote: &PaymentVote) -> Result<VoteOutcome, Rejection> {
        if !self.sync.is_blockchain_synced() {
            return Err(Rejection::silent("blockchain is not synced"));
        }
        if from.protocol_version < MIN_WINNER_PEER_PROTO {
            return Err(Rejection::silent("peer protocol too old for payment votes"));
        }
        let tip = self
            .chain
            .tip()
            .ok_or_else(|| Rejection::silent("chain tip unavailable"))?;

        let hash = vote.hash();
        if self.has_vote(&hash) {
            self.sync.added_winner(hash);
            return Ok(VoteOutcome::AlreadySeen);
        }

        let enabled = self.registry.count_enabled(None);
        let tuning = self.registry.tuning();
        let first = tip.height.saturating_sub(tuning.vote_window_back(enabled));
        if vote.height < first || vote.height > tip.height + tuning.vote_window_ahead {
            return Err(Rejection::silent(format!(
                "vote height {} outside {first}..={}",
                vote.height,
                tip.height + tuning.vote_window_ahead
            )));
        }

        self.check_voter(from.id, vote)?;

        if !self.can_vote(vote.voter, vote.height) {
            return Err(Rejection::silent(format!(
                "{} already voted for height {}",
                vote.voter, vote.height
            )));
        }

        let signed = self
            .registry
            .find(&vote.voter)
            .is_some_and(|entry| vote.verify(&entry.operational_key));
        if !signed {
            self.registry.ask_for(from.id, vote.voter);
            let dos = if self.sync.is_synced() { MISBEHAVIOR_SCORE } else { 0 };
            return Err(Rejection::new("invalid payment vote signature", dos));
        }

        if !self.add_winning_vote(vote) {
            return Err(Rejection::silent("vote could not be recorded"));
        }
        tracing::debug!(voter = %vote.voter, height = vote.height, payee = %vote.payee, "payment vote accepted");
        self.peers.relay(MxMessage::PaymentVote(vote.clone()));
        self.sync.added_winner(hash);
        Ok(VoteOutcome::Accepted)
    }

    /// The voter must be a known masternode ranked inside the quorum at the
    /// vote's lookback height. The reference node is exempt.
    fn check_voter(&self, from: PeerId, vote: &PaymentVote) -> Result<(), Rejection> {
        if self.network().is_reference_node(&vote.voter) {
            return Ok(());
        }
        let Some(entry) = self.registry.find(&vote.voter) else {
            self.registry.ask_for(from, vote.voter);
            return Err(Rejection::silent(format!("unknown masternode {}", vote.voter)));
        };
        if entry.protocol_version < MIN_WINNER_PEER_PROTO {
            return Err(Rejection::silent(format!(
                "masternode protocol {} too old to vote",
                entry.protocol_version
            )));
        }

        let quorum = SIGNATURES_TOTAL as usize;
        let rank_height = vote.height.saturating_sub(SCORE_LOOKBACK);
        match self
            .registry
            .rank(&vote.voter, rank_height, MIN_WINNER_PEER_PROTO, true)
        {
            None => Err(Rejection::silent(format!(
                "{} is not ranked at height {rank_height}",
                vote.voter
            ))),
            Some(rank) if rank > quorum => {
                let dos = if rank > 2 * quorum && self.sync.is_synced() {
                    MISBEHAVIOR_SCORE
                } else {
                    0
                };
                Err(Rejection::new(
                    format!("{} has rank {rank}, quorum is {quorum}", vote.voter),
                    dos,
                ))
            }
            Some(_) => Ok(()),
        }
    }

    /// Handle a `mnget` request for our vote table.
    pub fn handle_payment_sync_request(&self, from: &PeerInfo, needed: u64) -> Result<usize, Rejection> {
        if !self.sync.is_blockchain_synced() {
            return Err(Rejection::silent("blockchain is not synced"));
        }
        if self.network() == NetworkId::Main && self.peers.has_fulfilled(from.id, PAYMENT_SYNC_REQUEST) {
            tracing::warn!(peer = %from.addr, "peer already asked for payment votes");
            self.peers.misbehaving(from.id, MISBEHAVIOR_SCORE);
            return Err(Rejection::new("payment sync already requested", MISBEHAVIOR_SCORE));
        }
        self.peers.fulfill(from.id, PAYMENT_SYNC_REQUEST);
        Ok(self.sync_peer(from.id, needed))
    }

    /// Send `peer` every vote from `needed` blocks back to the window's
    /// upper edge, then the count.
    pub fn sync_peer(&self, peer: PeerId, needed: u64) -> usize {
        let Some(tip) = self.chain.tip() else {
            return 0;
        };
        let tuning = self.registry.tuning();
        let needed = needed.min(tuning.vote_window_back(self.registry.count_enabled(None)));
        let lowest = tip.height.saturating_sub(needed);
        let highest = tip.height + tuning.vote_window_ahead;

        let votes: Vec<PaymentVote> = self
            .lock()
            .votes
            .values()
            .filter(|v| v.height >= lowest && v.height <= highest)
            .cloned()
            .collect();
        let sent = votes.len();
        for vote in votes {
            self.peers.send(peer, MxMessage::PaymentVote(vote));
        }
        self.peers.send(
            peer,
            MxMessage::StatusCount {
                asset: SyncAsset::Winners,
                count: sent as u32,
            },
        );
        tracing::info!(%peer, sent, "sent payment votes");
        sent
    }

    // ── Voting ourselves ────────────────────────────────────────────────

    /// Cast our own vote for `height` if we rank inside the quorum.
    pub fn process_block(
        &self,
        height: u64,
        voter: Outpoint,
        operational: &KeyPair,
    ) -> Result<PaymentVote, PaymentError> {
        if !self.network().is_reference_node(&voter) {
            let rank = self
                .registry
                .rank(
                    &voter,
                    height.saturating_sub(SCORE_LOOKBACK),
                    MIN_WINNER_PEER_PROTO,
                    true,
                )
                .ok_or(PaymentError::NotRanked(height))?;
            if rank > SIGNATURES_TOTAL as usize {
                return Err(PaymentError::OutsideQuorum { rank });
            }
        }
        if height <= self.last_block_height() {
            return Err(PaymentError::AlreadyVoted(height));
        }

        let selection = self.registry.next_in_queue(height, self);
        let winner = selection.winner.ok_or(PaymentError::NoPayee(height))?;
        let payee = mx_crypto::payee_script(&winner.collateral_key);

        let mut vote = PaymentVote::new(voter, height, payee);
        vote.sign(operational);
        if !self.add_winning_vote(&vote) {
            return Err(PaymentError::NotRecorded(height));
        }
        tracing::info!(height, winner = %winner.outpoint, eligible = selection.eligible, "voted for payee");
        self.peers.relay(MxMessage::PaymentVote(vote.clone()));
        self.last_block_height.store(height, Ordering::SeqCst);
        Ok(vote)
    }

    // ── Coinbase ────────────────────────────────────────────────────────

    /// Whether `tx` satisfies the tally at `height`. Heights nobody voted
    /// on are unenforced.
    pub fn is_transaction_valid(&self, tx: &CoinbaseTx, height: u64) -> bool {
        let payment = self.chain.masternode_payment(height, tx.value_out());
        match self.lock().blocks.get(&height) {
            Some(block) => block.is_transaction_valid(tx, payment),
            None => true,
        }
    }

    /// Block validation hook. Underpaying blocks are only refused once the
    /// enforcement spork is on and our own vote tables are synced.
    pub fn is_block_payee_valid(&self, tx: &CoinbaseTx, height: u64) -> bool {
        if !self.sync.is_synced() {
            tracing::debug!(height, "skipping payee check, masternode data is not synced");
            return true;
        }
        if self.is_transaction_valid(tx, height) {
            return true;
        }
        if self.sporks.is_active(Spork::PaymentEnforcement) {
            tracing::warn!(height, "invalid masternode payment");
            return false;
        }
        tracing::warn!(height, "masternode payment not enforced, accepting block");
        true
    }

    /// Set up the coinbase of the block after the tip: the first output takes
    /// the block value minus the masternode share, which goes to the voted
    /// payee or, with no votes, to the currently top-scored masternode.
    pub fn fill_block_payee(&self, tx: &mut CoinbaseTx, fees: u64) {
        let Some(tip) = self.chain.tip() else {
            return;
        };
        let height = tip.height + 1;
        let payee = self.block_payee(height).or_else(|| {
            self.registry
                .current(0, 0)
                .map(|entry| mx_crypto::payee_script(&entry.collateral_key))
        });

        let block_value = self.chain.block_value(tip.height, fees);
        let payment = self.chain.masternode_payment(height, block_value);

        tx.outputs.truncate(1);
        match tx.outputs.first_mut() {
            Some(first) => first.value = block_value,
            None => tx.outputs.push(TxOut::new(block_value, Script::default())),
        }
        match payee {
            Some(script) if height > 1 => {
                tracing::info!(height, payee = %script, payment, "masternode payment");
                tx.outputs[0].value = block_value.saturating_sub(payment);
                tx.outputs.push(TxOut::new(payment, script));
            }
            _ => tracing::debug!(height, "no masternode to pay"),
        }
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Drop votes older than the retained history and their tallies.
    pub fn clean_payment_list(&self) -> Result<usize, PaymentError> {
        let tip = self.chain.tip().ok_or(PaymentError::Busy)?;
        let tuning = self.registry.tuning();
        let limit = tuning
            .vote_window_back(self.registry.len())
            .max(tuning.payments_history_floor);

        let mut tables = self.tables.try_lock().map_err(|_| PaymentError::Busy)?;
        let stale: Vec<(Hash256, u64)> = tables
            .votes
            .iter()
            .filter(|(_, v)| tip.height.saturating_sub(v.height) > limit)
            .map(|(hash, v)| (*hash, v.height))
            .collect();
        for (hash, height) in &stale {
            tables.votes.remove(hash);
            tables.blocks.remove(height);
            self.sync.forget_winner(hash);
        }
        drop(tables);

        let horizon = tip.height.saturating_sub(limit);
        let mut voted = self.voted_heights.lock().unwrap_or_else(|e| e.into_inner());
        voted.retain(|_, heights| {
            *heights = heights.split_off(&horizon);
            !heights.is_empty()
        });
        drop(voted);

        if !stale.is_empty() {
            tracing::debug!(removed = stale.len(), limit, "cleaned payment votes");
        }
        Ok(stale.len())
    }

    // ── Persistence ─────────────────────────────────────────────────────

    pub fn dump(&self, store: &FlatFileStore) -> Result<DumpOutcome, PaymentError> {
        let snapshot = self.lock().clone();
        Ok(store.dump(&snapshot)?)
    }

    /// Replace the tables with the cache file, then drop stale votes.
    pub fn load(&self, store: &FlatFileStore) -> ReadResult {
        match store.read::<PaymentTables>() {
            Ok(tables) => {
                *self.lock() = tables;
                if let Err(e) = self.clean_payment_list() {
                    tracing::debug!(error = %e, "payment cache loaded without cleaning");
                }
                tracing::info!(summary = %self.summary(), "loaded payment cache");
                ReadResult::Ok
            }
            Err(reason) => reason,
        }
    }
}

impl PaymentSchedule for Payments {
    /// Whether `payee` is the tally leader at any height from the tip up to
    /// [`SCHEDULE_LOOKAHEAD`] blocks ahead, `not_height` excluded.
    fn is_scheduled(&self, payee: &Script, not_height: u64) -> bool {
        let Some(tip) = self.chain.tip() else {
            return false;
        };
        let tables = self.lock();
        (tip.height..=tip.height + SCHEDULE_LOOKAHEAD)
            .filter(|h| *h != not_height)
            .any(|h| {
                tables
                    .blocks
                    .get(&h)
                    .and_then(|b| b.payee())
                    .is_some_and(|p| p == payee)
            })
    }

    fn has_payee_with_votes(&self, height: u64, payee: &Script, votes: u32) -> bool {
        self.lock()
            .blocks
            .get(&height)
            .is_some_and(|b| b.has_payee_with_votes(payee, votes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use mx_nullables::chain::NULL_BLOCK_SUBSIDY;
    use mx_types::params::{PROTOCOL_VERSION, SIGNATURES_REQUIRED};

    fn tip(h: &Harness) -> u64 {
        h.chain.tip().unwrap().height
    }

    #[test]
    fn quorum_payee_is_the_only_valid_one() {
        let h = Harness::new(NetworkId::Main);
        let height = tip(&h) + 1;
        let (a, b) = (h.script(1), h.script(2));
        for i in 0..6u8 {
            assert!(h.payments.add_winning_vote(&h.unsigned_vote(10 + i, height, a.clone())));
        }
        for i in 0..5u8 {
            assert!(h.payments.add_winning_vote(&h.unsigned_vote(20 + i, height, b.clone())));
        }

        assert_eq!(h.payments.block_payee(height), Some(a.clone()));
        let payment = h.chain.masternode_payment(height, NULL_BLOCK_SUBSIDY);
        let pays = |s: &Script| {
            CoinbaseTx::new(vec![
                TxOut::new(NULL_BLOCK_SUBSIDY - payment, Script::default()),
                TxOut::new(payment, s.clone()),
            ])
        };
        assert!(h.payments.is_transaction_valid(&pays(&a), height));
        assert!(!h.payments.is_transaction_valid(&pays(&b), height));
    }

    #[test]
    fn unvoted_heights_accept_any_coinbase() {
        let h = Harness::new(NetworkId::Main);
        assert!(h.payments.is_transaction_valid(&CoinbaseTx::default(), tip(&h) + 1));
        assert_eq!(h.payments.required_payments_string(tip(&h) + 1), "Unknown");
    }

    #[test]
    fn duplicate_or_unanchored_votes_are_not_recorded() {
        let h = Harness::new(NetworkId::Main);
        let vote = h.unsigned_vote(1, tip(&h) + 1, h.script(1));
        assert!(h.payments.add_winning_vote(&vote));
        assert!(!h.payments.add_winning_vote(&vote));
        assert!(!h.payments.add_winning_vote(&h.unsigned_vote(1, SCORE_LOOKBACK - 1, h.script(1))));
        assert!(!h.payments.add_winning_vote(&h.unsigned_vote(1, tip(&h) + SCORE_LOOKBACK + 5, h.script(1))));
        assert_eq!(h.payments.len(), 1);
    }

    #[test]
    fn reference_node_votes_weigh_100() {
        let h = Harness::new(NetworkId::Main);
        let reference: Outpoint = NetworkId::Main.reference_node().parse().unwrap();
        let height = tip(&h) + 1;
        assert!(h.payments.add_winning_vote(&PaymentVote::new(reference, height, h.script(1))));
        assert!(h.payments.has_payee_with_votes(height, &h.script(1), REFERENCE_NODE_WEIGHT));
    }

    #[test]
    fn valid_vote_is_recorded_relayed_and_reported() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(3);
        let peer = h.peer(PROTOCOL_VERSION);
        let vote = h.signed_vote(&voters[0], tip(&h) + 1, h.script(9));

        assert_eq!(h.payments.handle_vote(&peer, &vote), Ok(VoteOutcome::Accepted));
        assert!(h.peers.relayed().contains(&MxMessage::PaymentVote(vote.clone())));
        assert!(h.sync.winners.lock().unwrap().contains(&vote.hash()));
        assert_eq!(h.payments.handle_vote(&peer, &vote), Ok(VoteOutcome::AlreadySeen));
    }

    #[test]
    fn second_vote_for_the_same_height_is_refused() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(3);
        let peer = h.peer(PROTOCOL_VERSION);
        let height = tip(&h) + 1;

        let first = h.signed_vote(&voters[0], height, h.script(1));
        let second = h.signed_vote(&voters[0], height, h.script(2));
        assert!(h.payments.handle_vote(&peer, &first).is_ok());
        let rejection = h.payments.handle_vote(&peer, &second).unwrap_err();
        assert_eq!(rejection.dos, 0);
        assert!(!h.payments.has_vote(&second.hash()));
        assert_eq!(h.payments.block_payee(height), Some(h.script(1)));
    }

    #[test]
    fn voting_elsewhere_in_between_does_not_reopen_a_height() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(3);
        let peer = h.peer(PROTOCOL_VERSION);
        let height = tip(&h) + 1;

        let first = h.signed_vote(&voters[0], height, h.script(1));
        let next = h.signed_vote(&voters[0], height + 1, h.script(1));
        let again = h.signed_vote(&voters[0], height, h.script(2));
        assert_eq!(h.payments.handle_vote(&peer, &first), Ok(VoteOutcome::Accepted));
        assert_eq!(h.payments.handle_vote(&peer, &next), Ok(VoteOutcome::Accepted));
        assert!(h.payments.handle_vote(&peer, &again).is_err());

        let tally = h.payments.tally(height).unwrap();
        assert_eq!(tally.payees.len(), 1);
        assert_eq!(tally.payees[0].votes, 1);
    }

    #[test]
    fn guard_heights_are_forgotten_with_the_history() {
        let h = Harness::with_blocks(NetworkId::Main, 1_300);
        let voter = Outpoint::new(Hash256::new([7; 32]), 0);
        let old = 150;
        assert!(h.payments.can_vote(voter, old));
        assert!(h.payments.can_vote(voter, tip(&h)));
        h.payments.clean_payment_list().unwrap();
        assert!(h.payments.can_vote(voter, old));
        assert!(!h.payments.can_vote(voter, tip(&h)));
    }

    #[test]
    fn votes_outside_the_window_are_dropped() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(4);
        let peer = h.peer(PROTOCOL_VERSION);
        // 4 enabled entries: the window reaches back 5 blocks.
        let too_old = h.signed_vote(&voters[0], tip(&h) - 6, h.script(1));
        let too_new = h.signed_vote(&voters[0], tip(&h) + 21, h.script(1));
        assert!(h.payments.handle_vote(&peer, &too_old).is_err());
        assert!(h.payments.handle_vote(&peer, &too_new).is_err());
        assert!(h.payments.is_empty());
        let edge = h.signed_vote(&voters[0], tip(&h) + 20, h.script(1));
        assert!(h.payments.handle_vote(&peer, &edge).is_ok());
    }

    #[test]
    fn old_peers_and_unsynced_chains_are_ignored() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(2);
        let vote = h.signed_vote(&voters[0], tip(&h) + 1, h.script(1));
        assert!(h.payments.handle_vote(&h.peer(MIN_WINNER_PEER_PROTO - 1), &vote).is_err());

        h.sync.blockchain_synced.store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(h.payments.handle_vote(&h.peer(PROTOCOL_VERSION), &vote).is_err());
        assert!(h.payments.is_empty());
    }

    #[test]
    fn unknown_voter_is_asked_for() {
        let h = Harness::new(NetworkId::Main);
        h.register_many(2);
        let stranger = h.node(77);
        let peer = h.peer(PROTOCOL_VERSION);
        let vote = h.signed_vote(&stranger, tip(&h) + 1, h.script(1));

        let rejection = h.payments.handle_vote(&peer, &vote).unwrap_err();
        assert_eq!(rejection.dos, 0);
        assert!(h
            .peers
            .sent_to(peer.id)
            .contains(&MxMessage::RequestList(stranger.outpoint)));
    }

    #[test]
    fn forged_signature_costs_20_once_synced() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(2);
        let peer = h.peer(PROTOCOL_VERSION);
        let mut forged = PaymentVote::new(voters[0].outpoint, tip(&h) + 1, h.script(1));
        forged.sign(&voters[1].operational);

        let rejection = h.payments.handle_vote(&peer, &forged).unwrap_err();
        assert_eq!(rejection.dos, 0);
        assert_eq!(h.peers.misbehavior(peer.id), 0);

        h.sync.synced.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut forged = PaymentVote::new(voters[0].outpoint, tip(&h) + 2, h.script(1));
        forged.sign(&voters[1].operational);
        let rejection = h.payments.handle_vote(&peer, &forged).unwrap_err();
        assert_eq!(rejection.dos, MISBEHAVIOR_SCORE);
        assert_eq!(h.peers.misbehavior(peer.id), MISBEHAVIOR_SCORE);
    }

    #[test]
    fn voters_outside_the_quorum_are_refused() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(12);
        let peer = h.peer(PROTOCOL_VERSION);
        let height = tip(&h) + 1;
        let ranks = h.registry.ranks(height - SCORE_LOOKBACK, MIN_WINNER_PEER_PROTO);
        let (_, last) = ranks.iter().max_by_key(|(rank, _)| *rank).unwrap();
        let outsider = voters.iter().find(|n| n.outpoint == last.outpoint).unwrap();

        let rejection = h
            .payments
            .handle_vote(&peer, &h.signed_vote(outsider, height, h.script(1)))
            .unwrap_err();
        // Rank 12 is outside the quorum but not far enough to be punished.
        assert_eq!(rejection.dos, 0);
        assert!(h.payments.is_empty());
    }

    #[test]
    fn payment_sync_sends_window_then_count() {
        let h = Harness::new(NetworkId::Main);
        h.register_many(4);
        let height = tip(&h) + 1;
        for i in 0..3u8 {
            h.payments.add_winning_vote(&h.unsigned_vote(i, height, h.script(1)));
        }
        h.payments.add_winning_vote(&h.unsigned_vote(9, tip(&h) - 50, h.script(1)));
        let peer = h.peer(PROTOCOL_VERSION);

        assert_eq!(h.payments.handle_payment_sync_request(&peer, 1000), Ok(3));
        let sent = h.peers.sent_to(peer.id);
        assert_eq!(sent.len(), 4);
        assert_eq!(
            sent.last(),
            Some(&MxMessage::StatusCount {
                asset: SyncAsset::Winners,
                count: 3
            })
        );

        let rejection = h.payments.handle_payment_sync_request(&peer, 1000).unwrap_err();
        assert_eq!(rejection.dos, MISBEHAVIOR_SCORE);
        assert_eq!(h.peers.misbehavior(peer.id), MISBEHAVIOR_SCORE);
    }

    #[test]
    fn repeated_payment_sync_is_allowed_off_mainnet() {
        let h = Harness::new(NetworkId::Test);
        let peer = h.peer(PROTOCOL_VERSION);
        assert_eq!(h.payments.handle_payment_sync_request(&peer, 10), Ok(0));
        assert_eq!(h.payments.handle_payment_sync_request(&peer, 10), Ok(0));
        assert_eq!(h.peers.misbehavior(peer.id), 0);
    }

    #[test]
    fn process_block_votes_for_the_queue_winner_once() {
        let h = Harness::new(NetworkId::Main);
        let voters = h.register_many(3);
        let height = tip(&h) + 10;
        let me = &voters[0];

        let vote = h.payments.process_block(height, me.outpoint, &me.operational).unwrap();
        // Our own vote is excluded from the schedule at its height.
        let winner = h.registry.next_in_queue(height, h.payments.as_ref()).winner.unwrap();
        assert_eq!(vote.payee, mx_crypto::payee_script(&winner.collateral_key));
        assert!(voters.iter().any(|n| n.payee() == vote.payee));
        assert!(vote.verify(&me.operational.public));
        assert!(h.peers.relayed().contains(&MxMessage::PaymentVote(vote.clone())));
        assert_eq!(h.payments.last_block_height(), height);

        assert!(matches!(
            h.payments.process_block(height, me.outpoint, &me.operational),
            Err(PaymentError::AlreadyVoted(_))
        ));
    }

    #[test]
    fn unregistered_node_does_not_vote() {
        let h = Harness::new(NetworkId::Main);
        h.register_many(2);
        let stranger = h.node(50);
        assert!(matches!(
            h.payments.process_block(tip(&h) + 10, stranger.outpoint, &stranger.operational),
            Err(PaymentError::NotRanked(_))
        ));
    }

    #[test]
    fn scheduled_payees_are_found_ahead_of_the_tip() {
        let h = Harness::new(NetworkId::Main);
        let height = tip(&h) + 3;
        h.payments.add_winning_vote(&h.unsigned_vote(1, height, h.script(1)));
        assert!(h.payments.is_scheduled(&h.script(1), 0));
        assert!(!h.payments.is_scheduled(&h.script(1), height));
        assert!(!h.payments.is_scheduled(&h.script(2), 0));
    }

    #[test]
    fn fill_block_payee_pays_the_voted_payee() {
        let h = Harness::new(NetworkId::Main);
        let height = tip(&h) + 1;
        for i in 0..SIGNATURES_REQUIRED as u8 {
            h.payments.add_winning_vote(&h.unsigned_vote(i, height, h.script(4)));
        }
        let mut tx = CoinbaseTx::new(vec![TxOut::new(0, h.script(99))]);
        h.payments.fill_block_payee(&mut tx, 500);

        let value = NULL_BLOCK_SUBSIDY + 500;
        let payment = h.chain.masternode_payment(height, value);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0], TxOut::new(value - payment, h.script(99)));
        assert_eq!(tx.outputs[1], TxOut::new(payment, h.script(4)));
        assert!(h.payments.is_transaction_valid(&tx, height));
    }

    #[test]
    fn fill_block_payee_falls_back_to_the_top_scorer() {
        let h = Harness::new(NetworkId::Main);
        h.register_many(3);
        let current = h.registry.current(0, 0).unwrap();
        let mut tx = CoinbaseTx::default();
        h.payments.fill_block_payee(&mut tx, 0);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].script, mx_crypto::payee_script(&current.collateral_key));
    }

    #[test]
    fn fill_block_payee_without_masternodes_keeps_everything() {
        let h = Harness::new(NetworkId::Main);
        let mut tx = CoinbaseTx::default();
        h.payments.fill_block_payee(&mut tx, 7);
        assert_eq!(tx.outputs, vec![TxOut::new(NULL_BLOCK_SUBSIDY + 7, Script::default())]);
    }

    #[test]
    fn enforcement_needs_sync_and_the_spork() {
        let h = Harness::new(NetworkId::Main);
        let height = tip(&h) + 1;
        for i in 0..SIGNATURES_REQUIRED as u8 {
            h.payments.add_winning_vote(&h.unsigned_vote(i, height, h.script(4)));
        }
        let unpaid = CoinbaseTx::new(vec![TxOut::new(NULL_BLOCK_SUBSIDY, Script::default())]);

        assert!(h.payments.is_block_payee_valid(&unpaid, height));
        h.sync.synced.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(h.payments.is_block_payee_valid(&unpaid, height));
        h.sporks.activate(Spork::PaymentEnforcement);
        assert!(!h.payments.is_block_payee_valid(&unpaid, height));
    }

    #[test]
    fn clean_drops_votes_beyond_the_history_floor() {
        let h = Harness::with_blocks(NetworkId::Main, 1_300);
        let old = h.unsigned_vote(1, 150, h.script(1));
        let recent = h.unsigned_vote(2, 1_200, h.script(1));
        assert!(h.payments.add_winning_vote(&old));
        assert!(h.payments.add_winning_vote(&recent));
        h.sync.added_winner(old.hash());

        assert_eq!(h.payments.clean_payment_list().unwrap(), 1);
        assert!(!h.payments.has_vote(&old.hash()));
        assert!(h.payments.tally(150).is_none());
        assert!(h.payments.has_vote(&recent.hash()));
        assert!(!h.sync.winners.lock().unwrap().contains(&old.hash()));
        assert_eq!(h.payments.oldest_block(), Some(1_200));
    }

    #[test]
    fn clean_defers_while_the_chain_is_busy() {
        let h = Harness::new(NetworkId::Main);
        h.chain.set_busy(true);
        assert!(matches!(h.payments.clean_payment_list(), Err(PaymentError::Busy)));
    }

    #[test]
    fn tables_survive_dump_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = payments_cache(dir.path(), NetworkId::Main);
        let h = Harness::new(NetworkId::Main);
        let height = tip(&h) + 1;
        h.payments.add_winning_vote(&h.unsigned_vote(1, height, h.script(1)));
        h.payments.add_winning_vote(&h.unsigned_vote(2, height, h.script(2)));
        assert_eq!(h.payments.dump(&store).unwrap(), DumpOutcome::Recreated);

        let fresh = Harness::new(NetworkId::Main);
        assert_eq!(fresh.payments.load(&store), ReadResult::Ok);
        assert_eq!(fresh.payments.summary(), "Votes: 2, Blocks: 1");
        assert_eq!(fresh.payments.newest_block(), Some(height));
    }

    #[test]
    fn corrupted_cache_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = payments_cache(dir.path(), NetworkId::Main);
        let h = Harness::new(NetworkId::Main);
        h.payments.add_winning_vote(&h.unsigned_vote(1, tip(&h) + 1, h.script(1)));
        h.payments.dump(&store).unwrap();

        let mut bytes = std::fs::read(store.path()).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;
        std::fs::write(store.path(), bytes).unwrap();

        let fresh = Harness::new(NetworkId::Main);
        assert_eq!(fresh.payments.load(&store), ReadResult::IncorrectHash);
        assert!(fresh.payments.is_empty());
    }
}

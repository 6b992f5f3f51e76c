//! Sync progress shared between message handlers and the sync driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use mx_masternode::SyncProgress;
use mx_messages::SyncAsset;
use mx_types::{ChainOracle, Clock, Hash256, Timestamp};

use crate::stage::{SyncStage, SYNC_THRESHOLD};

/// The blockchain-synced flag resets when it was not polled for this long.
const BLOCKCHAIN_POLL_GAP: u64 = 60 * 60;

/// A tip older than this means we are still catching up.
const MAX_TIP_AGE: u64 = 60 * 60;

/// Items reported by `StatusCount` messages for one asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssetCounts {
    /// Sum of the counts peers reported.
    pub sum: u64,
    /// Number of reports.
    pub reports: u32,
}

/// Everything the sync machine tracks. Reset wholesale on restart.
#[derive(Clone, Debug)]
pub struct SyncState {
    pub stage: SyncStage,
    pub attempt: u32,
    pub asset_started: Timestamp,
    pub last_list: Option<Timestamp>,
    pub last_winner: Option<Timestamp>,
    pub last_governance: Option<Timestamp>,
    pub last_failure: Option<Timestamp>,
    pub failures: u32,
    pub seen_list: HashMap<Hash256, u32>,
    pub seen_winners: HashMap<Hash256, u32>,
    pub seen_governance: HashMap<Hash256, u32>,
    pub counts: HashMap<SyncAsset, AssetCounts>,
}

impl SyncState {
    pub(crate) fn new(now: Timestamp) -> Self {
        Self {
            stage: SyncStage::Initial,
            attempt: 0,
            asset_started: now,
            last_list: None,
            last_winner: None,
            last_governance: None,
            last_failure: None,
            failures: 0,
            seen_list: HashMap::new(),
            seen_winners: HashMap::new(),
            seen_governance: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    /// Move to the stage after the current one and restart its clock.
    pub fn advance(&mut self, now: Timestamp) {
        let next = self.stage.next();
        if next == SyncStage::Finished {
            tracing::info!("masternode sync has finished");
        } else {
            tracing::info!(from = ?self.stage, to = ?next, "masternode sync stage advanced");
        }
        self.stage = next;
        self.attempt = 0;
        self.asset_started = now;
    }

    pub fn fail(&mut self, now: Timestamp) {
        tracing::warn!(stage = ?self.stage, "masternode sync has failed, will retry later");
        self.stage = SyncStage::Failed;
        self.attempt = 0;
        self.last_failure = Some(now);
        self.failures += 1;
    }

    pub fn counts(&self, asset: SyncAsset) -> AssetCounts {
        self.counts.get(&asset).copied().unwrap_or_default()
    }
}

/// Note a sighting of `hash`. Each item counts as new at most
/// [`SYNC_THRESHOLD`] times.
fn sighted(seen: &mut HashMap<Hash256, u32>, last: &mut Option<Timestamp>, hash: Hash256, now: Timestamp) {
    let count = seen.entry(hash).or_insert(0);
    if *count < SYNC_THRESHOLD {
        *count += 1;
        *last = Some(now);
    }
}

struct BlockchainSync {
    synced: bool,
    last_poll: Timestamp,
}

/// Sync state plus the blockchain-synced oracle.
///
/// Handlers on any connection thread report progress through
/// [`SyncProgress`]; only the sync driver moves between stages.
pub struct SyncStatus {
    chain: Arc<dyn ChainOracle>,
    clock: Arc<dyn Clock>,
    state: Mutex<SyncState>,
    blockchain: Mutex<BlockchainSync>,
}

impl SyncStatus {
    pub fn new(chain: Arc<dyn ChainOracle>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            chain,
            clock,
            state: Mutex::new(SyncState::new(now)),
            blockchain: Mutex::new(BlockchainSync {
                synced: false,
                last_poll: now,
            }),
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stage(&self) -> SyncStage {
        self.lock().stage
    }

    pub fn status_text(&self) -> &'static str {
        self.stage().status_text()
    }

    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// A copy of the full state, for status reports and tests.
    pub fn snapshot(&self) -> SyncState {
        self.lock().clone()
    }

    /// Start over from `Initial`.
    pub fn reset(&self) {
        let now = self.now();
        *self.lock() = SyncState::new(now);
        tracing::debug!("masternode sync reset");
    }

    /// A governance object or vote was received.
    pub fn added_governance_item(&self, hash: Hash256) {
        let now = self.now();
        let mut st = self.lock();
        let SyncState {
            seen_governance,
            last_governance,
            ..
        } = &mut *st;
        sighted(seen_governance, last_governance, hash, now);
    }

    /// Record a `StatusCount` report. Counts for any stage but the one
    /// being synced are ignored.
    pub fn status_count(&self, asset: SyncAsset, count: u32) {
        let mut st = self.lock();
        if !st.stage.counts(asset) {
            return;
        }
        let entry = st.counts.entry(asset).or_default();
        entry.sum += u64::from(count);
        entry.reports += 1;
        tracing::info!(?asset, count, "peer reported sync count");
    }
}

impl SyncProgress for SyncStatus {
    fn added_list_entry(&self, hash: Hash256) {
        let now = self.now();
        let mut st = self.lock();
        let SyncState {
            seen_list, last_list, ..
        } = &mut *st;
        sighted(seen_list, last_list, hash, now);
    }

    fn forget_list_entry(&self, hash: &Hash256) {
        self.lock().seen_list.remove(hash);
    }

    fn added_winner(&self, hash: Hash256) {
        let now = self.now();
        let mut st = self.lock();
        let SyncState {
            seen_winners,
            last_winner,
            ..
        } = &mut *st;
        sighted(seen_winners, last_winner, hash, now);
    }

    fn forget_winner(&self, hash: &Hash256) {
        self.lock().seen_winners.remove(hash);
    }

    fn is_synced(&self) -> bool {
        self.stage() == SyncStage::Finished
    }

    /// True once the tip is less than an hour old and no import is running.
    /// Latched until a poll gap of over an hour, which also restarts sync.
    fn is_blockchain_synced(&self) -> bool {
        let now = self.now();
        let mut bc = self.blockchain.lock().unwrap_or_else(|e| e.into_inner());
        if now.as_secs().saturating_sub(bc.last_poll.as_secs()) > BLOCKCHAIN_POLL_GAP {
            tracing::info!("blockchain sync check was idle for over an hour, restarting sync");
            bc.synced = false;
            self.reset();
        }
        bc.last_poll = now;

        if bc.synced {
            return true;
        }
        if self.chain.is_importing() {
            return false;
        }
        let Some(tip) = self.chain.tip() else {
            return false;
        };
        if tip.time.as_secs() + MAX_TIP_AGE < now.as_secs() {
            return false;
        }
        bc.synced = true;
        true
    }
}

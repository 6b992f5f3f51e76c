//! The registry: every known masternode plus the caches and request
//! bookkeeping that surround it.
//!
//! All mutable state lives behind one coarse lock. Message handlers take it
//! for the duration of a lookup or mutation; the periodic sweep uses
//! `try_lock` and reports [`RegistryError::Busy`] instead of waiting.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mx_messages::{Announce, MxMessage, PeerId, PeerInfo, PeerTransport, Ping, Rejection, SyncAsset};
use mx_store::{DumpOutcome, FlatFileStore, ReadResult};
use mx_types::params::{LIST_REQUEST_SECONDS, MIN_PING_SECONDS, REMOVAL_SECONDS};
use mx_types::{
    ChainOracle, Clock, ConsensusTuning, Hash256, NetworkId, Outpoint, PublicKey, Script, Sporks,
    Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::collaborators::{min_payment_protocol, SyncProgress};
use crate::entry::{MasternodeEntry, MasternodeState};
use crate::RegistryError;

/// Magic message of the registry cache file.
pub const REGISTRY_CACHE_MAGIC: &str = "MasterXCache";

/// File name of the registry cache inside the data directory.
pub const REGISTRY_CACHE_FILE: &str = "mncache.dat";

pub fn registry_cache(data_dir: &Path, network: NetworkId) -> FlatFileStore {
    FlatFileStore::new(
        data_dir.join(REGISTRY_CACHE_FILE),
        REGISTRY_CACHE_MAGIC,
        network.magic(),
    )
}

/// Registry-wide settings fixed at construction.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub network: NetworkId,
    pub tuning: ConsensusTuning,
    /// Our operational key when this node runs as a masternode.
    pub local_operational_key: Option<PublicKey>,
}

impl RegistryConfig {
    pub fn new(network: NetworkId) -> Self {
        Self {
            network,
            tuning: ConsensusTuning::default(),
            local_operational_key: None,
        }
    }
}

/// Everything guarded by the registry lock. This is also the cache file payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryState {
    pub(crate) entries: BTreeMap<Outpoint, MasternodeEntry>,
    /// Who asked us for the full list, and when they may ask again.
    pub(crate) asked_us_for_list: HashMap<IpAddr, Timestamp>,
    /// Who we asked for the full list, and when we may ask again.
    pub(crate) we_asked_for_list: HashMap<IpAddr, Timestamp>,
    /// Entries we asked for after an unknown ping, and when we may ask again.
    pub(crate) we_asked_for_entry: HashMap<Outpoint, Timestamp>,
    pub(crate) seen_announces: HashMap<Hash256, Announce>,
    pub(crate) seen_pings: HashMap<Hash256, Ping>,
}

/// Result of a successful announce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// Already in the seen cache; nothing was re-validated.
    AlreadySeen,
    /// Valid, and the entry was already known (possibly refreshed in place).
    Known,
    /// A new entry was admitted. `remote_activation` is set when the
    /// announce carries our own operational key.
    Added { remote_activation: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingOutcome {
    AlreadySeen,
    Accepted,
}

/// What one sweep removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_entries: usize,
    pub expired_announces: usize,
    pub expired_pings: usize,
}

/// The authoritative set of known masternodes.
pub struct Registry {
    pub(crate) config: RegistryConfig,
    pub(crate) chain: Arc<dyn ChainOracle>,
    pub(crate) sporks: Arc<dyn Sporks>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) peers: Arc<dyn PeerTransport>,
    pub(crate) sync: Arc<dyn SyncProgress>,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(
        config: RegistryConfig,
        chain: Arc<dyn ChainOracle>,
        sporks: Arc<dyn Sporks>,
        clock: Arc<dyn Clock>,
        peers: Arc<dyn PeerTransport>,
        sync: Arc<dyn SyncProgress>,
    ) -> Self {
        Self {
            config,
            chain,
            sporks,
            clock,
            peers,
            sync,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn network(&self) -> NetworkId {
        self.config.network
    }

    pub fn tuning(&self) -> &ConsensusTuning {
        &self.config.tuning
    }

    pub fn min_payment_protocol(&self) -> u32 {
        min_payment_protocol(self.sporks.as_ref())
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Blocking lock. A poisoned lock is recovered: the state is plain data
    /// and every mutation leaves it consistent.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock(&self) -> Result<MutexGuard<'_, RegistryState>, RegistryError> {
        match self.state.try_lock() {
            Ok(guard) => Ok(guard),
            Err(std::sync::TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => Err(RegistryError::Busy),
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Insert an enabled entry that is not known yet.
    pub fn add(&self, entry: MasternodeEntry) -> bool {
        let mut st = self.lock();
        Self::add_locked(&mut st, entry)
    }

    pub(crate) fn add_locked(st: &mut RegistryState, entry: MasternodeEntry) -> bool {
        if !entry.is_enabled() || st.entries.contains_key(&entry.outpoint) {
            return false;
        }
        tracing::debug!(
            outpoint = %entry.outpoint,
            addr = %entry.addr,
            count = st.entries.len() + 1,
            "adding new masternode"
        );
        st.entries.insert(entry.outpoint, entry);
        true
    }

    pub fn find(&self, outpoint: &Outpoint) -> Option<MasternodeEntry> {
        self.lock().entries.get(outpoint).cloned()
    }

    pub fn find_by_operational_key(&self, key: &PublicKey) -> Option<MasternodeEntry> {
        self.lock()
            .entries
            .values()
            .find(|e| e.operational_key == *key)
            .cloned()
    }

    /// The entry whose collateral key pays to `payee`.
    pub fn find_by_payee(&self, payee: &Script) -> Option<MasternodeEntry> {
        self.lock()
            .entries
            .values()
            .find(|e| mx_crypto::payee_script(&e.collateral_key) == *payee)
            .cloned()
    }

    pub fn remove(&self, outpoint: &Outpoint) -> bool {
        let removed = self.lock().entries.remove(outpoint);
        if let Some(entry) = &removed {
            tracing::debug!(outpoint = %outpoint, addr = %entry.addr, "removed masternode");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, ordered by outpoint.
    pub fn entries(&self) -> Vec<MasternodeEntry> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn has_seen_announce(&self, hash: &Hash256) -> bool {
        self.lock().seen_announces.contains_key(hash)
    }

    pub fn has_seen_ping(&self, hash: &Hash256) -> bool {
        self.lock().seen_pings.contains_key(hash)
    }

    /// Enabled entries at or above `min_protocol` (default: the payment floor).
    pub fn count_enabled(&self, min_protocol: Option<u32>) -> usize {
        let mut st = self.lock();
        self.count_enabled_locked(&mut st, min_protocol)
    }

    pub(crate) fn count_enabled_locked(
        &self,
        st: &mut RegistryState,
        min_protocol: Option<u32>,
    ) -> usize {
        let min_protocol = min_protocol.unwrap_or_else(|| self.min_payment_protocol());
        let now = self.now();
        let mut count = 0;
        for entry in st.entries.values_mut() {
            entry.check(false, now, self.chain.as_ref());
            if entry.protocol_version >= min_protocol && entry.is_enabled() {
                count += 1;
            }
        }
        count
    }

    /// Re-evaluate every entry.
    pub fn check(&self) {
        let now = self.now();
        for entry in self.lock().entries.values_mut() {
            entry.check(false, now, self.chain.as_ref());
        }
    }

    pub fn clear(&self) {
        *self.lock() = RegistryState::default();
    }

    // ── Sweep ───────────────────────────────────────────────────────────

    /// Drop dead entries together with everything cached about them, then
    /// prune expired caches and request bookkeeping.
    ///
    /// Forgetting a dead entry's announces lets the node come back with the
    /// same announce once it pings again.
    pub fn check_and_remove(&self, force_expired: bool) -> Result<SweepReport, RegistryError> {
        let mut st = self.try_lock()?;
        Ok(self.check_and_remove_locked(&mut st, force_expired))
    }

    fn check_and_remove_locked(&self, st: &mut RegistryState, force_expired: bool) -> SweepReport {
        let now = self.now();
        let min_protocol = self.min_payment_protocol();
        for entry in st.entries.values_mut() {
            entry.check(false, now, self.chain.as_ref());
        }

        let doomed: Vec<Outpoint> = st
            .entries
            .values()
            .filter(|e| {
                matches!(e.state, MasternodeState::Remove | MasternodeState::CollateralSpent)
                    || (force_expired && e.state == MasternodeState::Expired)
                    || e.protocol_version < min_protocol
            })
            .map(|e| e.outpoint)
            .collect();

        let mut report = SweepReport::default();
        for outpoint in &doomed {
            if let Some(entry) = st.entries.remove(outpoint) {
                tracing::debug!(
                    outpoint = %outpoint,
                    addr = %entry.addr,
                    state = %entry.state,
                    count = st.entries.len(),
                    "removing inactive masternode"
                );
            }
            let sync = &self.sync;
            st.seen_announces.retain(|hash, announce| {
                let keep = announce.outpoint != *outpoint;
                if !keep {
                    sync.forget_list_entry(hash);
                }
                keep
            });
            st.seen_pings.retain(|_, ping| ping.outpoint != *outpoint);
            st.we_asked_for_entry.remove(outpoint);
            report.removed_entries += 1;
        }

        st.asked_us_for_list.retain(|_, t| *t >= now);
        st.we_asked_for_list.retain(|_, t| *t >= now);
        st.we_asked_for_entry.retain(|_, t| *t >= now);

        let cutoff = now.minus(REMOVAL_SECONDS * 2);
        let before = st.seen_announces.len();
        let sync = &self.sync;
        st.seen_announces.retain(|hash, announce| {
            let keep = announce.last_ping.sig_time >= cutoff;
            if !keep {
                tracing::trace!(hash = %hash, "removing expired announce");
                sync.forget_list_entry(hash);
            }
            keep
        });
        report.expired_announces = before - st.seen_announces.len();

        let before = st.seen_pings.len();
        st.seen_pings.retain(|_, ping| ping.sig_time >= cutoff);
        report.expired_pings = before - st.seen_pings.len();

        report
    }

    // ── List requests ───────────────────────────────────────────────────

    /// Ask `peer` for the announce of an entry we only know from a ping.
    /// At most once per [`MIN_PING_SECONDS`] per outpoint.
    pub fn ask_for(&self, peer: PeerId, outpoint: Outpoint) -> bool {
        let mut st = self.lock();
        self.ask_for_locked(&mut st, peer, outpoint)
    }

    pub(crate) fn ask_for_locked(
        &self,
        st: &mut RegistryState,
        peer: PeerId,
        outpoint: Outpoint,
    ) -> bool {
        let now = self.now();
        if st.we_asked_for_entry.get(&outpoint).is_some_and(|t| now < *t) {
            return false;
        }
        tracing::info!(%peer, %outpoint, "asking peer for missing masternode entry");
        self.peers.send(peer, MxMessage::RequestList(outpoint));
        st.we_asked_for_entry.insert(outpoint, now.plus(MIN_PING_SECONDS));
        true
    }

    /// Ask `peer` for the full list, at most once per [`LIST_REQUEST_SECONDS`]
    /// per public mainnet peer.
    pub fn request_list_from(&self, peer: &PeerInfo) -> bool {
        let now = self.now();
        let mut st = self.lock();
        let ip = peer.addr.ip();
        if self.config.network == NetworkId::Main && !peer.addr.is_private() {
            if st.we_asked_for_list.get(&ip).is_some_and(|t| now < *t) {
                tracing::debug!(peer = %peer.addr, "already asked peer for the list, skipping");
                return false;
            }
        }
        self.peers.send(peer.id, MxMessage::RequestList(Outpoint::NULL));
        st.we_asked_for_list.insert(ip, now.plus(LIST_REQUEST_SECONDS));
        true
    }

    /// Answer a list request. Returns the number of announces sent.
    ///
    /// Full-list requests from public mainnet peers are allowed once per
    /// [`LIST_REQUEST_SECONDS`]; asking again earlier scores 34.
    pub fn handle_request_list(&self, from: &PeerInfo, outpoint: Outpoint) -> Result<usize, Rejection> {
        let now = self.now();
        let full_list = outpoint.is_null();
        let mut st = self.lock();

        if full_list && !from.addr.is_private() && self.config.network == NetworkId::Main {
            let ip = from.addr.ip();
            if st.asked_us_for_list.get(&ip).is_some_and(|t| now < *t) {
                tracing::warn!(peer = %from.addr, "peer already asked for the list");
                self.peers.misbehaving(from.id, 34);
                return Err(Rejection::new("list requested again too soon", 34));
            }
            st.asked_us_for_list.insert(ip, now.plus(LIST_REQUEST_SECONDS));
        }

        let matching: Vec<Announce> = st
            .entries
            .values()
            .filter(|e| !e.addr.is_rfc1918() && e.is_enabled())
            .filter(|e| full_list || e.outpoint == outpoint)
            .map(MasternodeEntry::to_announce)
            .collect();

        let sent = matching.len();
        for announce in matching {
            st.seen_announces
                .entry(announce.hash())
                .or_insert_with(|| announce.clone());
            self.peers.send(from.id, MxMessage::Announce(announce));
        }

        if full_list {
            self.peers.send(
                from.id,
                MxMessage::StatusCount {
                    asset: SyncAsset::List,
                    count: sent as u32,
                },
            );
        }
        tracing::info!(peer = %from.addr, sent, "sent masternode entries");
        Ok(sent)
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Write the registry cache. The state is cloned under the lock and
    /// written after releasing it.
    pub fn dump(&self, store: &FlatFileStore) -> Result<DumpOutcome, RegistryError> {
        let snapshot = self.lock().clone();
        Ok(store.dump(&snapshot)?)
    }

    /// Replace the in-memory state with the cache file, then sweep it.
    ///
    /// Any read failure leaves the registry empty and is returned so the
    /// caller can log it; the list is rebuilt from the network.
    pub fn load(&self, store: &FlatFileStore) -> ReadResult {
        match store.read::<RegistryState>() {
            Ok(state) => {
                let mut st = self.lock();
                *st = state;
                let report = self.check_and_remove_locked(&mut st, true);
                tracing::info!(
                    entries = st.entries.len(),
                    removed = report.removed_entries,
                    "loaded masternode cache"
                );
                ReadResult::Ok
            }
            Err(reason) => reason,
        }
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let st = self.lock();
        format!(
            "masternodes: {}, peers who asked us for the list: {}, peers we asked for the list: {}, entries we asked for: {}",
            st.entries.len(),
            st.asked_us_for_list.len(),
            st.we_asked_for_list.len(),
            st.we_asked_for_entry.len()
        )
    }
}

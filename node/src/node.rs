//! The running masternode service.
//!
//! [`MasternodeNode`] wires the registry, payment consensus, sync machine
//! and local masternode to the host node's collaborators. The host feeds it
//! decoded messages through [`MasternodeNode::handle_message`] and the
//! maintenance loop drives everything time-based.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use mx_consensus::{payments_cache, Payments, VoteOutcome};
use mx_masternode::{
    registry_cache, ActiveMasternode, AnnounceOutcome, PingOutcome, Registry, RegistryConfig,
    RegistryError, SyncProgress,
};
use mx_messages::{MxMessage, PaymentVote, PeerInfo, PeerTransport, Rejection};
use mx_network::{SyncDriver, SyncStatus};
use mx_store::{FlatFileStore, ReadResult};
use mx_types::params::{DUMP_SECONDS, PING_SECONDS};
use mx_types::{ChainOracle, Clock, NetworkId, Sporks};

use crate::{NodeConfig, NodeError, NodeMetrics, ShutdownController};

/// Heights ahead of the tip we vote for.
const VOTE_AHEAD: u64 = 10;

/// Synced ticks between registry sweeps and payment cleanups.
const SWEEP_TICKS: u64 = 60;

/// Everything the masternode layer consumes from the host node.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainOracle>,
    pub sporks: Arc<dyn Sporks>,
    pub clock: Arc<dyn Clock>,
    pub peers: Arc<dyn PeerTransport>,
}

/// Point-in-time summary, serialized for status reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub network: NetworkId,
    pub sync_stage: u32,
    pub sync_status: String,
    pub sync_failures: u32,
    pub synced: bool,
    pub masternodes: usize,
    pub enabled: usize,
    pub payment_votes: usize,
    pub payment_blocks: usize,
    pub local_masternode: Option<String>,
}

pub struct MasternodeNode {
    pub config: NodeConfig,
    pub registry: Arc<Registry>,
    pub payments: Arc<Payments>,
    pub sync: Arc<SyncStatus>,
    pub driver: Arc<SyncDriver>,
    pub active: Option<Arc<ActiveMasternode>>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    chain: Arc<dyn ChainOracle>,
    registry_store: FlatFileStore,
    payments_store: FlatFileStore,
    last_tip: Mutex<Option<u64>>,
    /// Maintenance ticks taken while the blockchain was synced.
    synced_ticks: AtomicU64,
}

impl MasternodeNode {
    pub fn new(config: NodeConfig, collab: Collaborators) -> Result<Self, NodeError> {
        let network = config.network;
        let active_config = config.active_config()?;

        let sync = Arc::new(SyncStatus::new(collab.chain.clone(), collab.clock.clone()));
        let registry = Arc::new(Registry::new(
            RegistryConfig {
                network,
                tuning: config.tuning.clone(),
                local_operational_key: active_config.as_ref().map(|a| a.operational.public),
            },
            collab.chain.clone(),
            collab.sporks.clone(),
            collab.clock.clone(),
            collab.peers.clone(),
            sync.clone(),
        ));
        let payments = Arc::new(Payments::new(
            registry.clone(),
            collab.chain.clone(),
            collab.sporks.clone(),
            collab.peers.clone(),
            sync.clone(),
        ));
        let active = active_config.map(|c| Arc::new(ActiveMasternode::new(c, registry.clone())));

        let mut driver = SyncDriver::new(
            network,
            sync.clone(),
            registry.clone(),
            collab.peers.clone(),
            collab.sporks.clone(),
        );
        if let Some(active) = &active {
            driver = driver.with_active(active.clone());
        }

        Ok(Self {
            registry_store: registry_cache(&config.data_dir, network),
            payments_store: payments_cache(&config.data_dir, network),
            config,
            registry,
            payments,
            sync,
            driver: Arc::new(driver),
            active,
            metrics: Arc::new(NodeMetrics::new()?),
            shutdown: Arc::new(ShutdownController::new()),
            chain: collab.chain,
            last_tip: Mutex::new(None),
            synced_ticks: AtomicU64::new(0),
        })
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Read both caches. A failed read leaves that table empty; it is
    /// rebuilt from the network.
    pub fn load_caches(&self) -> (ReadResult, ReadResult) {
        let registry = self.registry.load(&self.registry_store);
        if registry != ReadResult::Ok {
            tracing::warn!(
                path = %self.registry_store.path().display(),
                result = %registry,
                "masternode cache not loaded, starting empty"
            );
        }
        let payments = self.payments.load(&self.payments_store);
        if payments != ReadResult::Ok {
            tracing::warn!(
                path = %self.payments_store.path().display(),
                result = %payments,
                "payment cache not loaded, starting empty"
            );
        }
        self.refresh_gauges();
        (registry, payments)
    }

    pub fn dump_caches(&self) -> Result<(), NodeError> {
        let registry = self.registry.dump(&self.registry_store)?;
        let payments = self.payments.dump(&self.payments_store)?;
        tracing::info!(?registry, ?payments, "masternode caches written");
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Route one message from `from` to its handler.
    ///
    /// Misbehavior is scored by the handlers; the rejection is returned so
    /// the transport can log or disconnect.
    pub fn handle_message(&self, from: &PeerInfo, message: MxMessage) -> Result<(), Rejection> {
        let command = message.command();
        let result = self.dispatch(from, message);
        if let Err(rejection) = &result {
            self.metrics.messages_rejected.inc();
            tracing::debug!(peer = %from.addr, command, %rejection, "message rejected");
        }
        result
    }

    fn dispatch(&self, from: &PeerInfo, message: MxMessage) -> Result<(), Rejection> {
        match message {
            MxMessage::Announce(announce) => {
                match self.registry.handle_announce(Some(from.id), &announce)? {
                    AnnounceOutcome::AlreadySeen => {}
                    AnnounceOutcome::Known => self.metrics.announces_accepted.inc(),
                    AnnounceOutcome::Added { remote_activation } => {
                        self.metrics.announces_accepted.inc();
                        if remote_activation {
                            if let Some(active) = &self.active {
                                active.enable_hot_cold(announce.outpoint, announce.addr);
                            }
                        }
                    }
                }
            }
            MxMessage::Ping(ping) => {
                if self.registry.handle_ping(from.id, &ping)? == PingOutcome::Accepted {
                    self.metrics.pings_accepted.inc();
                }
            }
            MxMessage::RequestList(outpoint) => {
                self.registry.handle_request_list(from, outpoint)?;
            }
            MxMessage::PaymentVote(vote) => {
                if self.payments.handle_vote(from, &vote)? == VoteOutcome::Accepted {
                    self.metrics.votes_accepted.inc();
                }
            }
            MxMessage::RequestPaymentSync(needed) => {
                self.payments
                    .handle_payment_sync_request(from, u64::from(needed))?;
            }
            MxMessage::StatusCount { asset, count } => self.sync.status_count(asset, count),
            MxMessage::GetSporks | MxMessage::RequestGovernanceSync => {
                tracing::trace!(peer = %from.addr, "request left to the spork and governance handlers");
            }
        }
        Ok(())
    }

    // ── Chain events ────────────────────────────────────────────────────

    /// A new block was connected at `height`. Casts our own vote for
    /// `height + 10` when we run a started masternode.
    pub fn updated_block_tip(&self, height: u64) -> Option<PaymentVote> {
        tracing::debug!(height, "updated block tip");
        let active = self.active.as_ref()?;
        if !self.sync.is_blockchain_synced() {
            return None;
        }
        let outpoint = active.outpoint()?;
        match self
            .payments
            .process_block(height + VOTE_AHEAD, outpoint, active.operational_key())
        {
            Ok(vote) => {
                self.metrics.own_votes.inc();
                Some(vote)
            }
            Err(e) => {
                tracing::debug!(height = height + VOTE_AHEAD, error = %e, "no payment vote cast");
                None
            }
        }
    }

    /// Poll the chain and report a tip change.
    fn check_tip(&self) {
        let Some(tip) = self.chain.tip() else {
            return;
        };
        let changed = {
            let mut last = self.last_tip.lock().unwrap_or_else(|e| e.into_inner());
            let changed = *last != Some(tip.height);
            *last = Some(tip.height);
            changed
        };
        if changed {
            self.updated_block_tip(tip.height);
        }
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// One pass of the once-per-second maintenance loop.
    pub fn maintenance_step(&self) {
        if let Err(e) = self.driver.tick() {
            tracing::debug!(error = %e, "masternode sync step");
        }
        self.check_tip();

        if self.sync.is_blockchain_synced() {
            let c = self.synced_ticks.fetch_add(1, Ordering::SeqCst) + 1;

            if c % PING_SECONDS == 1 {
                if let Some(active) = &self.active {
                    active.manage_status();
                }
            }

            if c % SWEEP_TICKS == 0 {
                match self.registry.check_and_remove(false) {
                    Ok(report) => tracing::debug!(?report, "masternode sweep"),
                    Err(RegistryError::Busy) => tracing::debug!("registry busy, sweep deferred"),
                    Err(e) => tracing::warn!(error = %e, "masternode sweep failed"),
                }
                match self.payments.clean_payment_list() {
                    Ok(removed) => tracing::debug!(removed, "payment list cleaned"),
                    Err(e) => tracing::debug!(error = %e, "payment cleanup deferred"),
                }
            }

            if c % DUMP_SECONDS == 0 {
                if let Err(e) = self.dump_caches() {
                    tracing::warn!(error = %e, "failed to write masternode caches");
                }
            }
        }

        self.refresh_gauges();
    }

    fn refresh_gauges(&self) {
        self.metrics.masternodes.set(self.registry.len() as i64);
        self.metrics
            .masternodes_enabled
            .set(self.registry.count_enabled(None) as i64);
        self.metrics.sync_stage.set(i64::from(self.sync.stage().code()));
        self.metrics.payment_votes.set(self.payments.len() as i64);
    }

    /// Spawn the maintenance loop. It runs until [`ShutdownController::shutdown`]
    /// and writes both caches on the way out.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        tracing::info!(
            network = %self.config.network,
            port = self.config.p2p_port(),
            data_dir = %self.config.data_dir.display(),
            masternode = self.active.is_some(),
            "masternode service starting"
        );
        let node = Arc::clone(self);
        let mut stop = self.shutdown.subscribe();
        let period = Duration::from_millis(self.config.maintenance_interval_ms.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.stopped() => {
                        tracing::info!("maintenance loop shutting down");
                        break;
                    }
                    _ = interval.tick() => node.maintenance_step(),
                }
            }
            if let Err(e) = node.dump_caches() {
                tracing::warn!(error = %e, "failed to write masternode caches on shutdown");
            }
        })
    }

    /// Signal the maintenance loop and wait for its final dump.
    pub async fn stop(&self, handle: tokio::task::JoinHandle<()>) {
        self.shutdown.shutdown();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "maintenance loop ended abnormally");
        }
    }

    // ── Status ──────────────────────────────────────────────────────────

    pub fn status(&self) -> NodeStatus {
        let stage = self.sync.stage();
        NodeStatus {
            network: self.config.network,
            sync_stage: stage.code(),
            sync_status: stage.status_text().to_string(),
            sync_failures: self.sync.failures(),
            synced: self.sync.is_synced(),
            masternodes: self.registry.len(),
            enabled: self.registry.count_enabled(None),
            payment_votes: self.payments.len(),
            payment_blocks: self.payments.block_count(),
            local_masternode: self.active.as_ref().map(|a| a.status().to_string()),
        }
    }

    pub fn status_json(&self) -> Result<String, NodeError> {
        Ok(serde_json::to_string_pretty(&self.status())?)
    }
}

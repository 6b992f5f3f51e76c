//! The staged sync driver.
//!
//! Every [`SYNC_TIMEOUT`] ticks the driver looks at the current stage and
//! asks one peer for the stage's data. A stage ends when items stop
//! arriving, or times out when none ever arrived. Missing list or winner
//! data fails the sync while payment enforcement is on; otherwise an empty
//! stage counts as done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mx_masternode::{ActiveMasternode, Registry, SyncProgress};
use mx_messages::{MxMessage, PeerInfo, PeerTransport};
use mx_types::params::MIN_GOVERNANCE_PEER_PROTO;
use mx_types::{NetworkId, Spork, Sporks, Timestamp};

use crate::error::SyncError;
use crate::stage::{SyncStage, FAILURE_COOLDOWN, SYNC_THRESHOLD, SYNC_TIMEOUT};
use crate::status::{SyncState, SyncStatus};

/// Fulfilled-request keys, one per stage.
const SPORKS_REQUEST: &str = "getspork";
const LIST_REQUEST: &str = "gmsync";
const WINNERS_REQUEST: &str = "mnwsync";
const GOVERNANCE_REQUEST: &str = "busync";

/// Attempts after which a stage stops asking new peers.
const MAX_ATTEMPTS: u32 = SYNC_THRESHOLD * 3;

/// Work that needs the registry lock, run after the sync lock is released.
enum Deferred {
    RequestList(PeerInfo),
    ManageStatus,
}

/// Inputs read before the sync lock is taken.
struct Tick {
    now: Timestamp,
    enabled: usize,
    min_payment_protocol: u32,
    enforcement: bool,
    peers: Vec<PeerInfo>,
}

pub struct SyncDriver {
    network: NetworkId,
    status: Arc<SyncStatus>,
    registry: Arc<Registry>,
    peers: Arc<dyn PeerTransport>,
    sporks: Arc<dyn Sporks>,
    active: Option<Arc<ActiveMasternode>>,
    ticks: AtomicU64,
}

impl SyncDriver {
    pub fn new(
        network: NetworkId,
        status: Arc<SyncStatus>,
        registry: Arc<Registry>,
        peers: Arc<dyn PeerTransport>,
        sporks: Arc<dyn Sporks>,
    ) -> Self {
        Self {
            network,
            status,
            registry,
            peers,
            sporks,
            active: None,
            ticks: AtomicU64::new(0),
        }
    }

    /// Try to start our own masternode as soon as governance sync ends.
    pub fn with_active(mut self, active: Arc<ActiveMasternode>) -> Self {
        self.active = Some(active);
        self
    }

    pub fn status(&self) -> &Arc<SyncStatus> {
        &self.status
    }

    /// Called once per second; does work every [`SYNC_TIMEOUT`] calls.
    pub fn tick(&self) -> Result<SyncStage, SyncError> {
        if self.ticks.fetch_add(1, Ordering::SeqCst) % SYNC_TIMEOUT != 0 {
            return Ok(self.status.stage());
        }
        self.process()
    }

    /// Run one step of the sync machine and return the resulting stage.
    pub fn process(&self) -> Result<SyncStage, SyncError> {
        let enabled = self.registry.count_enabled(None);
        if self.status.is_synced() {
            if enabled > 0 {
                return Ok(SyncStage::Finished);
            }
            tracing::info!("lost every enabled masternode, restarting sync");
            self.status.reset();
        }

        // Polled before the state lock: a long idle gap resets the state.
        let blockchain_synced = self.status.is_blockchain_synced();
        let tick = Tick {
            now: self.status.now(),
            enabled,
            min_payment_protocol: self.registry.min_payment_protocol(),
            enforcement: self.sporks.is_active(Spork::PaymentEnforcement),
            peers: self.peers.peers(),
        };

        let (stage, deferred) = {
            let mut st = self.status.lock();
            if st.stage == SyncStage::Failed {
                let cooled = st
                    .last_failure
                    .map_or(true, |t| t.plus(FAILURE_COOLDOWN) < tick.now);
                if !cooled {
                    return Err(SyncError::Failed {
                        failures: st.failures,
                    });
                }
                tracing::info!(failures = st.failures, "retrying masternode sync");
                *st = SyncState::new(tick.now);
            }

            if st.stage == SyncStage::Initial {
                self.clear_fulfilled(&tick.peers);
                st.advance(tick.now);
            }

            let deferred = if self.network != NetworkId::Regtest
                && !blockchain_synced
                && st.stage > SyncStage::Sporks
            {
                None
            } else if self.network == NetworkId::Regtest {
                self.regtest_step(&mut st, &tick)
            } else {
                self.stage_step(&mut st, &tick)
            };
            (st.stage, deferred)
        };

        match deferred {
            Some(Deferred::RequestList(peer)) => {
                self.registry.request_list_from(&peer);
            }
            Some(Deferred::ManageStatus) => {
                if let Some(active) = &self.active {
                    active.manage_status();
                }
            }
            None => {}
        }
        Ok(stage)
    }

    fn clear_fulfilled(&self, peers: &[PeerInfo]) {
        for peer in peers {
            for request in [SPORKS_REQUEST, LIST_REQUEST, WINNERS_REQUEST, GOVERNANCE_REQUEST] {
                self.peers.clear_fulfilled(peer.id, request);
            }
        }
    }

    /// Claim `peer` for `request`. False if it was already asked.
    fn claim(&self, peer: &PeerInfo, request: &str) -> bool {
        if self.peers.has_fulfilled(peer.id, request) {
            return false;
        }
        self.peers.fulfill(peer.id, request);
        true
    }

    /// Attempt-driven shortcut used on regtest, where there is no real
    /// network to wait for.
    fn regtest_step(&self, st: &mut SyncState, tick: &Tick) -> Option<Deferred> {
        let peer = tick.peers.first()?;
        let deferred = match st.attempt {
            0..=2 => {
                self.peers.send(peer.id, MxMessage::GetSporks);
                None
            }
            3 => Some(Deferred::RequestList(peer.clone())),
            4 | 5 => {
                self.peers
                    .send(peer.id, MxMessage::RequestPaymentSync(tick.enabled as u32));
                self.peers.send(peer.id, MxMessage::RequestGovernanceSync);
                None
            }
            _ => {
                st.stage = SyncStage::Finished;
                None
            }
        };
        st.attempt += 1;
        deferred
    }

    fn stage_step(&self, st: &mut SyncState, tick: &Tick) -> Option<Deferred> {
        match st.stage {
            SyncStage::Sporks => {
                if self.timed_out(st, None, tick.now) {
                    st.advance(tick.now);
                    return None;
                }
                let peer = tick.peers.iter().find(|p| self.claim(p, SPORKS_REQUEST))?;
                self.peers.send(peer.id, MxMessage::GetSporks);
                if st.attempt >= SYNC_THRESHOLD {
                    st.advance(tick.now);
                }
                st.attempt += 1;
                None
            }
            SyncStage::List => {
                let last = st.last_list;
                if self.settle(st, last, tick) {
                    return None;
                }
                if st.attempt >= MAX_ATTEMPTS {
                    return None;
                }
                let peer = tick
                    .peers
                    .iter()
                    .filter(|p| p.protocol_version >= tick.min_payment_protocol)
                    .find(|p| self.claim(p, LIST_REQUEST))?;
                st.attempt += 1;
                Some(Deferred::RequestList(peer.clone()))
            }
            SyncStage::Winners => {
                let last = st.last_winner;
                if self.settle(st, last, tick) {
                    return None;
                }
                if st.attempt >= MAX_ATTEMPTS {
                    return None;
                }
                let peer = tick
                    .peers
                    .iter()
                    .filter(|p| p.protocol_version >= tick.min_payment_protocol)
                    .find(|p| self.claim(p, WINNERS_REQUEST))?;
                self.peers
                    .send(peer.id, MxMessage::RequestPaymentSync(tick.enabled as u32));
                st.attempt += 1;
                None
            }
            SyncStage::Governance => {
                let last = st.last_governance;
                let quiet = last.is_some_and(|t| t.plus(SYNC_TIMEOUT * 2) < tick.now)
                    && st.attempt >= SYNC_THRESHOLD;
                // No governance data at all is fine; just finish.
                if quiet || self.timed_out(st, last, tick.now) {
                    st.advance(tick.now);
                    return Some(Deferred::ManageStatus);
                }
                if st.attempt >= MAX_ATTEMPTS {
                    return None;
                }
                let peer = tick
                    .peers
                    .iter()
                    .filter(|p| p.protocol_version >= MIN_GOVERNANCE_PEER_PROTO)
                    .find(|p| self.claim(p, GOVERNANCE_REQUEST))?;
                self.peers.send(peer.id, MxMessage::RequestGovernanceSync);
                st.attempt += 1;
                None
            }
            SyncStage::Initial | SyncStage::Failed | SyncStage::Finished => None,
        }
    }

    /// Nothing ever arrived and we have asked enough peers or waited long enough.
    fn timed_out(&self, st: &SyncState, last: Option<Timestamp>, now: Timestamp) -> bool {
        last.is_none()
            && (st.attempt >= MAX_ATTEMPTS || st.asset_started.plus(SYNC_TIMEOUT * 5) < now)
    }

    /// Advance past a list or winners stage that went quiet, or give up on
    /// one that never produced anything. True when the stage changed.
    fn settle(&self, st: &mut SyncState, last: Option<Timestamp>, tick: &Tick) -> bool {
        let quiet = last.is_some_and(|t| t.plus(SYNC_TIMEOUT * 2) < tick.now)
            && st.attempt >= SYNC_THRESHOLD;
        if quiet {
            st.advance(tick.now);
            return true;
        }
        if self.timed_out(st, last, tick.now) {
            if tick.enforcement {
                st.fail(tick.now);
            } else {
                st.advance(tick.now);
            }
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_masternode::RegistryConfig;
    use mx_messages::PeerId;
    use mx_nullables::{NullChain, NullClock, NullPeers, NullSporks};
    use mx_types::params::PROTOCOL_VERSION;
    use mx_types::Hash256;

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<NullClock>,
        sporks: Arc<NullSporks>,
        peers: Arc<NullPeers>,
        status: Arc<SyncStatus>,
        driver: SyncDriver,
    }

    fn fixture(network: NetworkId, tip_age: u64) -> Fixture {
        let chain = Arc::new(NullChain::with_blocks(50, NOW - tip_age - 49 * 60, 60));
        let clock = Arc::new(NullClock::new(NOW));
        let sporks = Arc::new(NullSporks::new());
        let peers = Arc::new(NullPeers::new());
        let status = Arc::new(SyncStatus::new(chain.clone(), clock.clone()));
        let registry = Arc::new(Registry::new(
            RegistryConfig::new(network),
            chain,
            sporks.clone(),
            clock.clone(),
            peers.clone(),
            status.clone(),
        ));
        let driver = SyncDriver::new(network, status.clone(), registry, peers.clone(), sporks.clone());
        Fixture {
            clock,
            sporks,
            peers,
            status,
            driver,
        }
    }

    fn connect(f: &Fixture, count: u8) -> Vec<PeerId> {
        (1..=count)
            .map(|i| f.peers.connect(&format!("198.51.100.{i}:9667"), PROTOCOL_VERSION))
            .collect()
    }

    /// Let a stage with nothing to show run past its deadline.
    fn expire_stage(f: &Fixture) {
        f.clock.advance(SYNC_TIMEOUT * 5 + 1);
    }

    #[test]
    fn empty_list_stage_advances_without_enforcement() {
        let f = fixture(NetworkId::Main, 0);
        assert_eq!(f.driver.process(), Ok(SyncStage::Sporks));
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::List));
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::Winners));
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::Governance));
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::Finished));
        assert!(f.status.is_synced());
    }

    #[test]
    fn empty_list_stage_fails_under_enforcement_then_recovers() {
        let f = fixture(NetworkId::Main, 0);
        f.sporks.activate(Spork::PaymentEnforcement);
        f.driver.process().unwrap();
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::List));
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::Failed));
        assert_eq!(f.status.failures(), 1);
        assert_eq!(f.status.status_text(), "Synchronization failed");

        f.clock.advance(FAILURE_COOLDOWN);
        assert_eq!(f.driver.process(), Err(SyncError::Failed { failures: 1 }));

        f.clock.advance(1);
        assert_eq!(f.driver.process(), Ok(SyncStage::Sporks));
    }

    #[test]
    fn stages_ask_one_new_peer_per_step() {
        let f = fixture(NetworkId::Main, 0);
        let ids = connect(&f, 3);

        assert_eq!(f.driver.process(), Ok(SyncStage::Sporks));
        assert_eq!(f.driver.process(), Ok(SyncStage::Sporks));
        // The third spork request completes the stage.
        assert_eq!(f.driver.process(), Ok(SyncStage::List));
        for id in &ids {
            assert_eq!(f.peers.sent_to(*id), vec![MxMessage::GetSporks]);
        }

        assert_eq!(f.driver.process(), Ok(SyncStage::List));
        assert_eq!(f.peers.sent_to(ids[0]).last(), Some(&MxMessage::RequestList(mx_types::Outpoint::NULL)));
        assert_eq!(f.peers.sent_to(ids[1]).len(), 1);
    }

    #[test]
    fn quiet_list_stage_moves_on() {
        let f = fixture(NetworkId::Main, 0);
        connect(&f, 4);
        for _ in 0..3 {
            f.driver.process().unwrap();
        }
        assert_eq!(f.status.stage(), SyncStage::List);

        f.status.added_list_entry(Hash256::new([1u8; 32]));
        f.driver.process().unwrap();
        assert_eq!(f.status.snapshot().attempt, 2);

        f.clock.advance(SYNC_TIMEOUT * 2 - 1);
        assert_eq!(f.driver.process(), Ok(SyncStage::List));
        f.clock.advance(2);
        assert_eq!(f.driver.process(), Ok(SyncStage::Winners));
    }

    #[test]
    fn old_peers_are_not_asked_for_the_list() {
        let f = fixture(NetworkId::Main, 0);
        let old = f.peers.connect("198.51.100.9:9667", 70_100);
        f.status.lock().stage = SyncStage::List;
        f.driver.process().unwrap();
        assert!(f.peers.sent_to(old).is_empty());
    }

    #[test]
    fn stale_chain_holds_sync_after_sporks() {
        let f = fixture(NetworkId::Main, 2 * 60 * 60);
        let ids = connect(&f, 1);
        f.driver.process().unwrap();
        expire_stage(&f);
        assert_eq!(f.driver.process(), Ok(SyncStage::List));
        f.peers.clear_traffic();
        for _ in 0..5 {
            expire_stage(&f);
            assert_eq!(f.driver.process(), Ok(SyncStage::List));
        }
        assert!(f.peers.sent_to(ids[0]).is_empty());
    }

    #[test]
    fn finished_sync_restarts_when_no_masternode_is_left() {
        let f = fixture(NetworkId::Main, 0);
        f.status.lock().stage = SyncStage::Finished;
        assert_eq!(f.driver.process(), Ok(SyncStage::Sporks));
    }

    #[test]
    fn regtest_runs_on_attempts() {
        let f = fixture(NetworkId::Regtest, 0);
        let ids = connect(&f, 1);
        let mut stages = Vec::new();
        for _ in 0..7 {
            stages.push(f.driver.process().unwrap());
        }
        assert_eq!(stages.last(), Some(&SyncStage::Finished));
        let sent = f.peers.sent_to(ids[0]);
        assert_eq!(sent.iter().filter(|m| **m == MxMessage::GetSporks).count(), 3);
        assert!(sent.contains(&MxMessage::RequestList(mx_types::Outpoint::NULL)));
        assert_eq!(sent.iter().filter(|m| **m == MxMessage::RequestGovernanceSync).count(), 2);
    }

    #[test]
    fn tick_works_every_fifth_call() {
        let f = fixture(NetworkId::Main, 0);
        assert_eq!(f.driver.tick(), Ok(SyncStage::Sporks));
        expire_stage(&f);
        for _ in 1..SYNC_TIMEOUT {
            assert_eq!(f.driver.tick(), Ok(SyncStage::Sporks));
        }
        assert_eq!(f.driver.tick(), Ok(SyncStage::List));
    }
}

//! The local masternode: activation and periodic pings.
//!
//! A node configured with an operational key manages its own entry. With a
//! collateral key it announces itself (cold activation in one process);
//! without one it waits until an announce carrying its operational key shows
//! up in the registry (hot/cold activation).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mx_messages::{Announce, MxMessage, Ping};
use mx_types::network::MAINNET_MASTERNODE_PORT;
use mx_types::params::{
    MASTERNODE_COLLATERAL, MIN_CONFIRMATIONS, PING_ANCHOR_DEPTH, PING_SECONDS, PROTOCOL_VERSION,
};
use mx_types::{Hash256, KeyPair, NetAddress, NetworkId, Outpoint, UtxoStatus};

use crate::entry::collateral_age;
use crate::registry::Registry;
use crate::ActiveError;

/// Where the local masternode stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActiveStatus {
    Initial,
    SyncInProcess,
    InputTooNew,
    NotCapable(String),
    Started,
}

impl fmt::Display for ActiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("Node just started, not yet activated"),
            Self::SyncInProcess => f.write_str(
                "Sync in progress. Must wait until sync is complete to start MasterX",
            ),
            Self::InputTooNew => write!(
                f,
                "MasterX input must have at least {MIN_CONFIRMATIONS} confirmations"
            ),
            Self::NotCapable(reason) => write!(f, "Not capable masterx: {reason}"),
            Self::Started => f.write_str("MasterX successfully started"),
        }
    }
}

/// Collateral held by this node.
pub struct LocalCollateral {
    pub outpoint: Outpoint,
    pub key: KeyPair,
}

pub struct ActiveConfig {
    pub network: NetworkId,
    pub operational: KeyPair,
    /// Public address we announce. Required for cold activation.
    pub service: Option<NetAddress>,
    /// `None` runs as a hot node waiting for remote activation.
    pub collateral: Option<LocalCollateral>,
}

struct ActiveState {
    status: ActiveStatus,
    outpoint: Option<Outpoint>,
    service: Option<NetAddress>,
}

pub struct ActiveMasternode {
    config: ActiveConfig,
    registry: Arc<Registry>,
    state: Mutex<ActiveState>,
}

impl ActiveMasternode {
    pub fn new(config: ActiveConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            state: Mutex::new(ActiveState {
                status: ActiveStatus::Initial,
                outpoint: None,
                service: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ActiveStatus {
        self.lock().status.clone()
    }

    pub fn outpoint(&self) -> Option<Outpoint> {
        self.lock().outpoint
    }

    pub fn service(&self) -> Option<NetAddress> {
        self.lock().service
    }

    pub fn operational_key(&self) -> &KeyPair {
        &self.config.operational
    }

    fn set_status(&self, status: ActiveStatus) {
        if !matches!(status, ActiveStatus::Started) {
            tracing::info!(status = %status, "masternode not started");
        }
        self.lock().status = status;
    }

    /// Advance activation, or ping once started.
    pub fn manage_status(&self) {
        let network = self.config.network;
        if network != NetworkId::Regtest && !self.registry.sync.is_blockchain_synced() {
            self.set_status(ActiveStatus::SyncInProcess);
            return;
        }

        let status = {
            let mut st = self.lock();
            if st.status == ActiveStatus::SyncInProcess {
                st.status = ActiveStatus::Initial;
            }
            st.status.clone()
        };

        if status == ActiveStatus::Initial {
            self.registry.check();
            if let Some(entry) = self
                .registry
                .find_by_operational_key(&self.config.operational.public)
            {
                if entry.is_enabled() && entry.protocol_version == PROTOCOL_VERSION {
                    self.enable_hot_cold(entry.outpoint, entry.addr);
                }
            }
        }

        if self.status() != ActiveStatus::Started {
            if let Err(reason) = self.try_start() {
                self.set_status(reason);
            }
            return;
        }

        if let Err(err) = self.send_ping() {
            tracing::debug!(%err, "masternode ping not sent");
        }
    }

    /// Cold activation: validate our collateral and announce ourselves.
    fn try_start(&self) -> Result<(), ActiveStatus> {
        let network = self.config.network;
        let Some(collateral) = &self.config.collateral else {
            return Err(not_capable("Hot node, waiting for remote activation."));
        };
        let Some(service) = self.config.service else {
            return Err(not_capable(
                "Can't detect external address. Please use the masternode address configuration option.",
            ));
        };

        let port = service.port();
        if network == NetworkId::Main && port != MAINNET_MASTERNODE_PORT {
            return Err(not_capable(format!(
                "Invalid port: {port} - only {MAINNET_MASTERNODE_PORT} is supported on mainnet."
            )));
        }
        if network != NetworkId::Main && port == MAINNET_MASTERNODE_PORT {
            return Err(not_capable(format!(
                "Invalid port: {port} - {MAINNET_MASTERNODE_PORT} is only supported on mainnet."
            )));
        }

        let chain = self.registry.chain.as_ref();
        let outpoint = collateral.outpoint;
        let suitable = chain.collateral_output(&outpoint).is_some_and(|out| {
            out.value == MASTERNODE_COLLATERAL
                && out.script == mx_crypto::payee_script(&collateral.key.public)
        }) && matches!(chain.utxo_status(&outpoint), Ok(UtxoStatus::Unspent { .. }));
        if !suitable {
            return Err(not_capable("Could not find suitable coins!"));
        }

        let age = collateral_age(chain, &outpoint).unwrap_or(0);
        if age < MIN_CONFIRMATIONS {
            tracing::info!(%outpoint, confirmations = age, "masternode input too new");
            return Err(ActiveStatus::InputTooNew);
        }

        if chain.is_importing() {
            return Err(not_capable("Error on CreateBroadcast: chain is importing"));
        }
        let anchor = self
            .ping_anchor()
            .ok_or_else(|| not_capable("Error on CreateBroadcast: chain tip is unavailable"))?;

        let announce = Announce::signed(
            outpoint,
            service,
            &collateral.key,
            &self.config.operational,
            PROTOCOL_VERSION,
            anchor,
            self.registry.now(),
        );
        self.registry.register_local_announce(&announce);
        tracing::info!(%outpoint, addr = %service, "relaying masternode announce");
        self.registry.peers.relay(MxMessage::Announce(announce));

        let mut st = self.lock();
        st.status = ActiveStatus::Started;
        st.outpoint = Some(outpoint);
        st.service = Some(service);
        tracing::info!(%outpoint, "masternode started");
        Ok(())
    }

    /// Hash of the block [`PING_ANCHOR_DEPTH`] below the tip.
    fn ping_anchor(&self) -> Option<Hash256> {
        let chain = self.registry.chain.as_ref();
        let tip = chain.tip()?;
        chain.block_hash(tip.height.saturating_sub(PING_ANCHOR_DEPTH))
    }

    /// Sign and relay a ping for our entry, at most once per [`PING_SECONDS`].
    pub fn send_ping(&self) -> Result<(), ActiveError> {
        let outpoint = {
            let st = self.lock();
            if st.status != ActiveStatus::Started {
                return Err(ActiveError::NotStarted);
            }
            st.outpoint.ok_or(ActiveError::NotStarted)?
        };
        let anchor = self.ping_anchor().ok_or(ActiveError::NoChain)?;
        let now = self.registry.now();

        let Some(entry) = self.registry.find(&outpoint) else {
            let reason = format!(
                "MasterX list doesn't include our masternode, shutting down pinging service! {outpoint}"
            );
            self.set_status(not_capable(reason));
            return Err(ActiveError::NotRegistered(outpoint));
        };
        if entry.is_pinged_within(PING_SECONDS, now) {
            return Err(ActiveError::PingTooEarly(entry.last_ping.sig_time.elapsed_since(now)));
        }

        let ping = Ping::signed(outpoint, anchor, now, &self.config.operational);
        tracing::info!(%outpoint, "relaying masternode ping");
        if !self.registry.apply_local_ping(&ping) {
            return Err(ActiveError::NotRegistered(outpoint));
        }
        Ok(())
    }

    /// Adopt an entry announced elsewhere with our operational key.
    pub fn enable_hot_cold(&self, outpoint: Outpoint, service: NetAddress) {
        let mut st = self.lock();
        st.status = ActiveStatus::Started;
        st.outpoint = Some(outpoint);
        st.service = Some(service);
        tracing::info!(%outpoint, addr = %service, "enabled by remote activation, the cold node may shut down");
    }
}

fn not_capable(reason: impl Into<String>) -> ActiveStatus {
    ActiveStatus::NotCapable(reason.into())
}

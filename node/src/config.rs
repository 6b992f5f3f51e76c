//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use mx_crypto::keypair_from_hex;
use mx_masternode::{ActiveConfig, LocalCollateral};
use mx_types::{ConsensusTuning, NetAddress, NetworkId, Outpoint};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a masternode-layer node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to join.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Directory holding `mncache.dat` and `mnpayments.dat`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// P2P port. Zero means the network default.
    #[serde(default)]
    pub port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Run a local masternode.
    #[serde(default)]
    pub masternode: bool,

    /// Hex seed of the operational key that signs pings and votes.
    #[serde(default)]
    pub masternode_key: Option<String>,

    /// Public `ip:port` the local masternode announces.
    #[serde(default)]
    pub masternode_addr: Option<String>,

    /// Collateral as `txid-index`. Leave unset, together with
    /// `collateral_key`, to wait for a remote (hot/cold) activation.
    #[serde(default)]
    pub collateral_outpoint: Option<String>,

    /// Hex seed of the key owning the collateral output.
    #[serde(default)]
    pub collateral_key: Option<String>,

    /// Milliseconds between maintenance ticks.
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Feature switches, until sporks are fed from the network.
    #[serde(default)]
    pub sporks: SporkConfig,

    #[serde(default)]
    pub tuning: ConsensusTuning,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SporkConfig {
    pub payment_enforcement: bool,
    pub pay_updated_nodes: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Main
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./mx_data")
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_maintenance_interval_ms() -> u64 {
    1000
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// The configured port, or the network default.
    pub fn p2p_port(&self) -> u16 {
        if self.port == 0 {
            self.network.default_port()
        } else {
            self.port
        }
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// Settings for the local masternode, or `None` when it is disabled.
    pub fn active_config(&self) -> Result<Option<ActiveConfig>, NodeError> {
        if !self.masternode {
            return Ok(None);
        }
        let key = self
            .masternode_key
            .as_deref()
            .ok_or_else(|| NodeError::Config("masternode requires masternode_key".to_string()))?;
        let operational = keypair_from_hex(key)?;

        let service = self
            .masternode_addr
            .as_deref()
            .map(|addr| {
                addr.parse::<NetAddress>()
                    .map_err(|e| NodeError::Config(format!("masternode_addr: {e}")))
            })
            .transpose()?;

        let collateral = match (&self.collateral_outpoint, &self.collateral_key) {
            (Some(outpoint), Some(key)) => Some(LocalCollateral {
                outpoint: outpoint
                    .parse::<Outpoint>()
                    .map_err(|e| NodeError::Config(format!("collateral_outpoint: {e}")))?,
                key: keypair_from_hex(key)?,
            }),
            (None, None) => None,
            _ => {
                return Err(NodeError::Config(
                    "collateral_outpoint and collateral_key must be set together".to_string(),
                ))
            }
        };

        Ok(Some(ActiveConfig {
            network: self.network,
            operational,
            service,
            collateral,
        }))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            port: 0,
            log_format: default_log_format(),
            log_level: default_log_level(),
            masternode: false,
            masternode_key: None,
            masternode_addr: None,
            collateral_outpoint: None,
            collateral_key: None,
            maintenance_interval_ms: default_maintenance_interval_ms(),
            enable_metrics: false,
            sporks: SporkConfig::default(),
            tuning: ConsensusTuning::default(),
        }
    }
}

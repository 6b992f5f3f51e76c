//! Network identifier and the per-network constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Outpoint, TypesError};

/// Identifies which network a node is connected to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Main,
    /// The public test network.
    Test,
    /// Local regression-test network.
    Regtest,
}

/// Masternodes on mainnet must listen on this port, and nowhere else may they use it.
pub const MAINNET_MASTERNODE_PORT: u16 = 9667;

impl NetworkId {
    /// Default P2P port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Main => MAINNET_MASTERNODE_PORT,
            Self::Test => 19667,
            Self::Regtest => 29667,
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Regtest => "regtest",
        }
    }

    /// Network-specific message start bytes, also written into cache files.
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Self::Main => [0x3f, 0xb2, 0x2c, 0x62],
            Self::Test => [0x8d, 0x3c, 0x9b, 0x1a],
            Self::Regtest => [0x3a, 0x3c, 0x3c, 0x3d],
        }
    }

    /// Collateral outpoint of this network's reference node.
    ///
    /// Trust exception: the reference node bootstraps payment consensus on a
    /// network with too few masternodes. Its votes skip rank validation and
    /// weigh 100 instead of 1.
    pub fn reference_node(&self) -> &'static str {
        match self {
            Self::Main => "099c01bea63abd1692f60806bb646fa1d288e2d049281225f17e499024084e28-0",
            Self::Test => "fbc16ae5229d6d99181802fd76a4feee5e7640164dcebc7f8feb04a7bea026f8-0",
            Self::Regtest => "e466f5d8beb4c2d22a314310dc58e0ea89505c95409754d0d68fb874952608cc-1",
        }
    }

    pub fn is_reference_node(&self, outpoint: &Outpoint) -> bool {
        outpoint.to_string() == self.reference_node()
    }

    /// Whether a masternode may announce itself on `port` in this network.
    pub fn is_valid_masternode_port(&self, port: u16) -> bool {
        match self {
            Self::Main => port == MAINNET_MASTERNODE_PORT,
            _ => port != MAINNET_MASTERNODE_PORT,
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            "regtest" => Ok(Self::Regtest),
            other => Err(TypesError::UnknownNetwork(other.to_string())),
        }
    }
}

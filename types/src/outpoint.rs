//! Collateral outpoint: the transaction output that backs a masternode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Hash256, TypesError};

/// A reference to a specific transaction output (`txid`, `index`).
///
/// Outpoints uniquely identify masternodes. The textual form is
/// `<txid hex>-<index>`, which is also the form used in signed vote messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Hash256,
    pub index: u32,
}

impl Outpoint {
    pub const NULL: Self = Self {
        txid: Hash256::ZERO,
        index: u32::MAX,
    };

    pub fn new(txid: Hash256, index: u32) -> Self {
        Self { txid, index }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Canonical byte form used when hashing: txid followed by little-endian index.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(self.txid.as_bytes());
        out[32..].copy_from_slice(&self.index.to_le_bytes());
        out
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.txid, self.index)
    }
}

impl FromStr for Outpoint {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, index) = s
            .rsplit_once('-')
            .ok_or_else(|| TypesError::InvalidOutpoint(s.to_string()))?;
        let index = index
            .parse::<u32>()
            .map_err(|_| TypesError::InvalidOutpoint(s.to_string()))?;
        Ok(Self::new(Hash256::from_hex(txid)?, index))
    }
}

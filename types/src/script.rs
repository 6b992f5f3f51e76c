//! Payout scripts and the minimal coinbase view used for payee checks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::hex;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// An output locking script.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Standard pay-to-key-id script for a 20-byte key id.
    pub fn pay_to_key_id(key_id: &[u8; 20]) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        bytes.extend_from_slice(key_id);
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Self(bytes)
    }

    /// The key id if this is a standard pay-to-key-id script.
    pub fn key_id(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            let mut id = [0u8; 20];
            id.copy_from_slice(&b[3..23]);
            Some(id)
        } else {
            None
        }
    }

    pub fn is_pay_to_key_id(&self) -> bool {
        self.key_id().is_some()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// A transaction output: amount plus locking script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script: Script,
}

impl TxOut {
    pub fn new(value: u64, script: Script) -> Self {
        Self { value, script }
    }
}

/// The outputs of a block's coinbase transaction.
///
/// Payment consensus only inspects outputs, so that is all this carries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseTx {
    pub outputs: Vec<TxOut>,
}

impl CoinbaseTx {
    pub fn new(outputs: Vec<TxOut>) -> Self {
        Self { outputs }
    }

    pub fn value_out(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Whether some output pays exactly `value` to `script`.
    pub fn pays(&self, script: &Script, value: u64) -> bool {
        self.outputs
            .iter()
            .any(|o| &o.script == script && o.value == value)
    }
}

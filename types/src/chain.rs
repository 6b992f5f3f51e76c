//! What the masternode layer reads from the blockchain engine and the spork system.

use crate::{Hash256, Outpoint, Timestamp, TxOut};

/// The active chain tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash256,
    pub time: Timestamp,
}

/// Spendability of a collateral outpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UtxoStatus {
    /// Unspent; `height` is the confirming block, `None` while still in the mempool.
    Unspent { height: Option<u64> },
    Spent,
}

/// The chain lock was contended; try again on a later tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainBusy;

/// Read-only view of the blockchain.
///
/// Every method must return promptly. Implementations that guard chain
/// state with a lock acquire it with try semantics and report contention as
/// `None` / [`ChainBusy`].
pub trait ChainOracle: Send + Sync {
    /// `None` before the first block is connected or while the chain is locked.
    fn tip(&self) -> Option<ChainTip>;

    /// Hash of the active-chain block at exactly `height`.
    fn block_hash(&self, height: u64) -> Option<Hash256>;

    fn block_time(&self, height: u64) -> Option<Timestamp>;

    /// Height of a block on the active chain.
    fn height_of(&self, hash: &Hash256) -> Option<u64>;

    /// The output an outpoint refers to, spent or not.
    fn collateral_output(&self, outpoint: &Outpoint) -> Option<TxOut>;

    fn utxo_status(&self, outpoint: &Outpoint) -> Result<UtxoStatus, ChainBusy>;

    /// True during reindex or bulk block import.
    fn is_importing(&self) -> bool;

    /// Subsidy plus fees for a block at `height`.
    fn block_value(&self, height: u64, fees: u64) -> u64;

    /// Portion of `block_value` owed to the masternode payee at `height`.
    fn masternode_payment(&self, height: u64, block_value: u64) -> u64;
}

/// Network-wide feature switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Spork {
    /// Reject blocks that do not pay the elected masternode.
    PaymentEnforcement,
    /// Only pay masternodes running the current protocol.
    PayUpdatedNodes,
}

pub trait Sporks: Send + Sync {
    fn is_active(&self, spork: Spork) -> bool;
}

//! Nullable chain: an in-memory block list and UTXO set.

use mx_types::params::COIN;
use mx_types::{
    ChainBusy, ChainOracle, ChainTip, Hash256, Outpoint, Timestamp, TxOut, UtxoStatus,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Subsidy of every block on the null chain.
pub const NULL_BLOCK_SUBSIDY: u64 = 10 * COIN;

struct Collateral {
    output: TxOut,
    height: Option<u64>,
    spent: bool,
}

struct ChainState {
    /// Index is the block height.
    blocks: Vec<(Hash256, Timestamp)>,
    collateral: HashMap<Outpoint, Collateral>,
    busy: bool,
    importing: bool,
    /// Masternode share of the block value, in percent.
    payment_percent: u64,
}

/// A deterministic blockchain for testing.
///
/// Block hashes are derived from the height so two chains built the same
/// way agree on every hash.
pub struct NullChain {
    state: Mutex<ChainState>,
}

impl NullChain {
    /// A chain with no blocks at all.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(ChainState {
                blocks: Vec::new(),
                collateral: HashMap::new(),
                busy: false,
                importing: false,
                payment_percent: 40,
            }),
        }
    }

    /// Blocks `0..count`, the first at `start_time`, then one every `spacing` seconds.
    pub fn with_blocks(count: u64, start_time: u64, spacing: u64) -> Self {
        let chain = Self::empty();
        for i in 0..count {
            chain.push_block(Timestamp::new(start_time + i * spacing));
        }
        chain
    }

    pub fn block_hash_for(height: u64) -> Hash256 {
        mx_crypto::hash_parts(&[b"null-chain-block", &height.to_le_bytes()])
    }

    /// Append one block; returns its hash.
    pub fn push_block(&self, time: Timestamp) -> Hash256 {
        let mut state = self.state.lock().unwrap();
        let hash = Self::block_hash_for(state.blocks.len() as u64);
        state.blocks.push((hash, time));
        hash
    }

    /// Append `count` blocks spaced `spacing` seconds after the current tip.
    pub fn mine(&self, count: u64, spacing: u64) {
        for _ in 0..count {
            let last = self
                .state
                .lock()
                .unwrap()
                .blocks
                .last()
                .map(|(_, t)| *t)
                .unwrap_or(Timestamp::EPOCH);
            self.push_block(last.plus(spacing));
        }
    }

    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().blocks.len().saturating_sub(1) as u64
    }

    /// Register a collateral output confirmed at `height` (`None` = mempool).
    pub fn add_collateral(&self, outpoint: Outpoint, output: TxOut, height: Option<u64>) {
        self.state.lock().unwrap().collateral.insert(
            outpoint,
            Collateral {
                output,
                height,
                spent: false,
            },
        );
    }

    pub fn spend(&self, outpoint: &Outpoint) {
        if let Some(c) = self.state.lock().unwrap().collateral.get_mut(outpoint) {
            c.spent = true;
        }
    }

    /// Simulate contention on the chain lock.
    pub fn set_busy(&self, busy: bool) {
        self.state.lock().unwrap().busy = busy;
    }

    pub fn set_importing(&self, importing: bool) {
        self.state.lock().unwrap().importing = importing;
    }

    pub fn set_payment_percent(&self, percent: u64) {
        self.state.lock().unwrap().payment_percent = percent;
    }
}

impl Default for NullChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl ChainOracle for NullChain {
    fn tip(&self) -> Option<ChainTip> {
        let state = self.state.lock().unwrap();
        if state.busy {
            return None;
        }
        let (hash, time) = *state.blocks.last()?;
        Some(ChainTip {
            height: state.blocks.len() as u64 - 1,
            hash,
            time,
        })
    }

    fn block_hash(&self, height: u64) -> Option<Hash256> {
        self.state.lock().unwrap().blocks.get(height as usize).map(|(h, _)| *h)
    }

    fn block_time(&self, height: u64) -> Option<Timestamp> {
        self.state.lock().unwrap().blocks.get(height as usize).map(|(_, t)| *t)
    }

    fn height_of(&self, hash: &Hash256) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .iter()
            .position(|(h, _)| h == hash)
            .map(|p| p as u64)
    }

    fn collateral_output(&self, outpoint: &Outpoint) -> Option<TxOut> {
        self.state
            .lock()
            .unwrap()
            .collateral
            .get(outpoint)
            .map(|c| c.output.clone())
    }

    fn utxo_status(&self, outpoint: &Outpoint) -> Result<UtxoStatus, ChainBusy> {
        let state = self.state.lock().unwrap();
        if state.busy {
            return Err(ChainBusy);
        }
        Ok(match state.collateral.get(outpoint) {
            Some(c) if !c.spent => UtxoStatus::Unspent { height: c.height },
            _ => UtxoStatus::Spent,
        })
    }

    fn is_importing(&self) -> bool {
        self.state.lock().unwrap().importing
    }

    fn block_value(&self, _height: u64, fees: u64) -> u64 {
        NULL_BLOCK_SUBSIDY + fees
    }

    fn masternode_payment(&self, _height: u64, block_value: u64) -> u64 {
        block_value * self.state.lock().unwrap().payment_percent / 100
    }
}

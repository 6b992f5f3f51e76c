//! The masternode record and its lifecycle.

use mx_messages::{Announce, Ping};
use mx_types::params::{CHECK_SECONDS, EXPIRATION_SECONDS, REMOVAL_SECONDS};
use mx_types::{
    ChainOracle, NetAddress, Outpoint, PublicKey, Signature, Timestamp, UtxoStatus,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state, re-evaluated by [`MasternodeEntry::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MasternodeState {
    Enabled,
    /// No ping for [`EXPIRATION_SECONDS`].
    Expired,
    /// Collateral spent. Terminal; no further checks run.
    CollateralSpent,
    /// No ping for [`REMOVAL_SECONDS`]. Terminal; swept on the next cleanup.
    Remove,
}

impl MasternodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Expired => "EXPIRED",
            Self::CollateralSpent => "VIN_SPENT",
            Self::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for MasternodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered masternode, keyed by its collateral outpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeEntry {
    pub outpoint: Outpoint,
    pub addr: NetAddress,
    pub collateral_key: PublicKey,
    pub operational_key: PublicKey,
    pub signature: Signature,
    pub sig_time: Timestamp,
    pub protocol_version: u32,
    pub state: MasternodeState,
    pub last_ping: Ping,
    pub allow_free_tx: bool,
    /// Last mixing-queue sequence number seen from this node.
    pub last_dsq: u64,
    pub scanning_error_count: u32,
    pub last_scanning_error_height: u64,
    cached_input_age: u64,
    cached_input_age_block: u64,
    last_checked: Timestamp,
}

impl MasternodeEntry {
    pub fn from_announce(announce: &Announce) -> Self {
        Self {
            outpoint: announce.outpoint,
            addr: announce.addr,
            collateral_key: announce.collateral_key,
            operational_key: announce.operational_key,
            signature: announce.signature,
            sig_time: announce.sig_time,
            protocol_version: announce.protocol_version,
            state: MasternodeState::Enabled,
            last_ping: announce.last_ping.clone(),
            allow_free_tx: true,
            last_dsq: 0,
            scanning_error_count: 0,
            last_scanning_error_height: 0,
            cached_input_age: 0,
            cached_input_age_block: 0,
            last_checked: Timestamp::EPOCH,
        }
    }

    /// Rebuild the announce this entry was created or last updated from.
    pub fn to_announce(&self) -> Announce {
        Announce {
            outpoint: self.outpoint,
            addr: self.addr,
            collateral_key: self.collateral_key,
            operational_key: self.operational_key,
            signature: self.signature,
            sig_time: self.sig_time,
            protocol_version: self.protocol_version,
            last_ping: self.last_ping.clone(),
        }
    }

    /// Seen-cache key of [`to_announce`](Self::to_announce).
    pub fn announce_hash(&self) -> mx_types::Hash256 {
        self.to_announce().hash()
    }

    pub fn is_enabled(&self) -> bool {
        self.state == MasternodeState::Enabled
    }

    /// False when no ping was ever recorded.
    pub fn is_pinged_within(&self, seconds: u64, now: Timestamp) -> bool {
        !self.last_ping.is_empty() && self.last_ping.sig_time.signed_elapsed(now) < seconds as i64
    }

    pub fn is_broadcast_within(&self, seconds: u64, now: Timestamp) -> bool {
        self.sig_time.signed_elapsed(now) < seconds as i64
    }

    /// Re-evaluate the lifecycle state.
    ///
    /// Runs at most once per [`CHECK_SECONDS`] unless forced. A contended
    /// chain leaves the state untouched until the next check.
    pub fn check(&mut self, force: bool, now: Timestamp, chain: &dyn ChainOracle) {
        if !force && self.last_checked.signed_elapsed(now) < CHECK_SECONDS as i64 {
            return;
        }
        self.last_checked = now;

        if self.state == MasternodeState::CollateralSpent {
            return;
        }
        if !self.is_pinged_within(REMOVAL_SECONDS, now) {
            self.state = MasternodeState::Remove;
            return;
        }
        if !self.is_pinged_within(EXPIRATION_SECONDS, now) {
            self.state = MasternodeState::Expired;
            return;
        }
        match chain.utxo_status(&self.outpoint) {
            Err(_) => return,
            Ok(UtxoStatus::Spent) => {
                self.state = MasternodeState::CollateralSpent;
                return;
            }
            Ok(UtxoStatus::Unspent { .. }) => {}
        }
        self.state = MasternodeState::Enabled;
    }

    /// Confirmations of the collateral, cached after the first lookup and
    /// advanced with the tip.
    pub fn input_age(&mut self, chain: &dyn ChainOracle) -> u64 {
        let Some(tip) = chain.tip() else {
            return 0;
        };
        if self.cached_input_age == 0 {
            self.cached_input_age = collateral_age(chain, &self.outpoint).unwrap_or(0);
            self.cached_input_age_block = tip.height;
        }
        self.cached_input_age + tip.height.saturating_sub(self.cached_input_age_block)
    }

    /// Copy the fields a newer announce may change. Returns false when the
    /// announce is not newer than what we hold.
    ///
    /// The embedded ping is applied by the caller, which has to validate it
    /// against the registry first.
    pub fn update_from_announce(&mut self, announce: &Announce) -> bool {
        if announce.sig_time <= self.sig_time {
            return false;
        }
        self.operational_key = announce.operational_key;
        self.sig_time = announce.sig_time;
        self.signature = announce.signature;
        self.protocol_version = announce.protocol_version;
        self.addr = announce.addr;
        self.last_checked = Timestamp::EPOCH;
        true
    }

    /// Forget the registration so the node must re-announce.
    pub fn disable(&mut self) {
        self.sig_time = Timestamp::EPOCH;
        self.last_ping = Ping::default();
    }
}

/// Confirmations of `outpoint`: 0 while in the mempool, `None` when spent,
/// unknown, or the chain is busy.
pub fn collateral_age(chain: &dyn ChainOracle, outpoint: &Outpoint) -> Option<u64> {
    match chain.utxo_status(outpoint).ok()? {
        UtxoStatus::Spent => None,
        UtxoStatus::Unspent { height: None } => Some(0),
        UtxoStatus::Unspent { height: Some(h) } => {
            let tip = chain.tip()?;
            Some((tip.height + 1).saturating_sub(h))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_crypto::keypair_from_seed;
    use mx_nullables::NullChain;
    use mx_types::params::{MASTERNODE_COLLATERAL, PROTOCOL_VERSION};
    use mx_types::{Hash256, TxOut};

    const NOW: u64 = 1_700_000_000;

    fn setup() -> (NullChain, MasternodeEntry) {
        let chain = NullChain::with_blocks(100, NOW - 100 * 60, 60);
        let collateral = keypair_from_seed(&[1u8; 32]);
        let operational = keypair_from_seed(&[2u8; 32]);
        let outpoint = Outpoint::new(Hash256::new([3u8; 32]), 0);
        chain.add_collateral(
            outpoint,
            TxOut {
                value: MASTERNODE_COLLATERAL,
                script: mx_crypto::payee_script(&collateral.public),
            },
            Some(50),
        );
        let announce = Announce::signed(
            outpoint,
            "203.0.113.1:9667".parse().unwrap(),
            &collateral,
            &operational,
            PROTOCOL_VERSION,
            Hash256::ZERO,
            Timestamp::new(NOW),
        );
        (chain, MasternodeEntry::from_announce(&announce))
    }

    #[test]
    fn fresh_entry_is_enabled() {
        let (chain, mut entry) = setup();
        entry.check(true, Timestamp::new(NOW + 60), &chain);
        assert_eq!(entry.state, MasternodeState::Enabled);
    }

    #[test]
    fn expires_then_is_marked_for_removal() {
        let (chain, mut entry) = setup();
        entry.check(true, Timestamp::new(NOW + EXPIRATION_SECONDS), &chain);
        assert_eq!(entry.state, MasternodeState::Expired);
        entry.check(true, Timestamp::new(NOW + REMOVAL_SECONDS), &chain);
        assert_eq!(entry.state, MasternodeState::Remove);
    }

    #[test]
    fn spent_collateral_is_sticky() {
        let (chain, mut entry) = setup();
        chain.spend(&entry.outpoint);
        entry.check(true, Timestamp::new(NOW + 10), &chain);
        assert_eq!(entry.state, MasternodeState::CollateralSpent);
        // even a missing ping no longer changes the state
        entry.check(true, Timestamp::new(NOW + REMOVAL_SECONDS * 2), &chain);
        assert_eq!(entry.state, MasternodeState::CollateralSpent);
    }

    #[test]
    fn busy_chain_leaves_state_alone() {
        let (chain, mut entry) = setup();
        entry.state = MasternodeState::Expired;
        chain.set_busy(true);
        entry.check(true, Timestamp::new(NOW + 10), &chain);
        assert_eq!(entry.state, MasternodeState::Expired);
    }

    #[test]
    fn unforced_check_is_throttled() {
        let (chain, mut entry) = setup();
        entry.check(true, Timestamp::new(NOW), &chain);
        chain.spend(&entry.outpoint);
        entry.check(false, Timestamp::new(NOW + CHECK_SECONDS - 1), &chain);
        assert!(entry.is_enabled());
        entry.check(false, Timestamp::new(NOW + CHECK_SECONDS), &chain);
        assert_eq!(entry.state, MasternodeState::CollateralSpent);
    }

    #[test]
    fn no_ping_means_not_pinged() {
        let (_, mut entry) = setup();
        entry.last_ping = Ping::default();
        assert!(!entry.is_pinged_within(u64::MAX / 2, Timestamp::new(NOW)));
    }

    #[test]
    fn input_age_is_cached_and_advances() {
        let (chain, mut entry) = setup();
        assert_eq!(entry.input_age(&chain), 50);
        chain.mine(3, 60);
        assert_eq!(entry.input_age(&chain), 53);
    }

    #[test]
    fn update_requires_newer_announce() {
        let (_, mut entry) = setup();
        let mut announce = entry.to_announce();
        assert!(!entry.update_from_announce(&announce));
        announce.sig_time = announce.sig_time.plus(1);
        announce.protocol_version += 1;
        assert!(entry.update_from_announce(&announce));
        assert_eq!(entry.protocol_version, PROTOCOL_VERSION + 1);
    }
}

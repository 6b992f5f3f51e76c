//! Applying announces to the registry.
//!
//! An announce passes three gates before a new entry exists:
//! 1. [`check_and_update`](Registry::check_and_update): timestamps, keys,
//!    signature, port; refreshes an existing entry in place.
//! 2. Collateral association: the outpoint must hold exactly the collateral
//!    amount paying the announced collateral key.
//! 3. [`check_inputs_and_add`](Registry::check_inputs_and_add): the
//!    collateral is unspent, old enough, and older than the signature.

use mx_messages::{Announce, MxMessage, PeerId, Rejection};
use mx_types::params::{
    MASTERNODE_COLLATERAL, MAX_TIME_SKEW, MIN_BROADCAST_SECONDS, MIN_CONFIRMATIONS,
    PROTOCOL_VERSION,
};
use mx_types::{NetworkId, UtxoStatus};

use crate::entry::{collateral_age, MasternodeEntry};
use crate::ping::PingCheck;
use crate::registry::{AnnounceOutcome, Registry, RegistryState};

impl Registry {
    /// Handle an announce received from `from` (`None` for locally
    /// originated ones). Misbehavior is scored against the sender.
    pub fn handle_announce(
        &self,
        from: Option<PeerId>,
        announce: &Announce,
    ) -> Result<AnnounceOutcome, Rejection> {
        let result = self.check_announce_and_update_list(announce);
        if let (Err(rejection), Some(peer)) = (&result, from) {
            if rejection.is_misbehavior() {
                self.peers.misbehaving(peer, rejection.dos);
            }
        }
        result
    }

    fn check_announce_and_update_list(&self, announce: &Announce) -> Result<AnnounceOutcome, Rejection> {
        let hash = announce.hash();
        let mut st = self.lock();
        tracing::trace!(outpoint = %announce.outpoint, "masternode announce");
        if st.seen_announces.contains_key(&hash) {
            self.sync.added_list_entry(hash);
            return Ok(AnnounceOutcome::AlreadySeen);
        }
        st.seen_announces.insert(hash, announce.clone());

        self.check_and_update(&mut st, announce)?;

        let associated = self.chain.collateral_output(&announce.outpoint).is_some_and(|out| {
            out.value == MASTERNODE_COLLATERAL
                && out.script == mx_crypto::payee_script(&announce.collateral_key)
        });
        if !associated {
            tracing::warn!(outpoint = %announce.outpoint, "collateral does not pay the announced key");
            return Err(Rejection::new("mismatched collateral key and outpoint", 33));
        }

        match self.check_inputs_and_add(&mut st, announce) {
            Ok(outcome) => {
                self.sync.added_list_entry(hash);
                Ok(outcome)
            }
            Err(rejection) => {
                tracing::debug!(addr = %announce.addr, %rejection, "rejected masternode entry");
                Err(rejection)
            }
        }
    }

    /// Validate an announce and refresh the entry it belongs to, if any.
    pub(crate) fn check_and_update(
        &self,
        st: &mut RegistryState,
        announce: &Announce,
    ) -> Result<(), Rejection> {
        let now = self.now();
        let outpoint = announce.outpoint;

        if announce.sig_time > now.plus(MAX_TIME_SKEW) {
            return Err(Rejection::new(
                format!("announce from {outpoint} signed too far into the future"),
                1,
            ));
        }
        if announce.protocol_version < self.min_payment_protocol() {
            return Err(Rejection::silent(format!(
                "outdated masternode {outpoint} protocol version {}",
                announce.protocol_version
            )));
        }
        if !mx_crypto::is_valid_public_key(&announce.collateral_key) {
            return Err(Rejection::new("invalid collateral key", 100));
        }
        if !mx_crypto::is_valid_public_key(&announce.operational_key) {
            return Err(Rejection::new("invalid operational key", 100));
        }
        if announce.last_ping.is_empty() {
            return Err(Rejection::silent(format!("announce from {outpoint} carries no ping")));
        }
        self.check_ping(st, &announce.last_ping, PingCheck::SigTimeOnly)?;

        let encoding = announce.verify_signature()?;
        tracing::trace!(%outpoint, ?encoding, "announce signature verified");

        if !self.config.network.is_valid_masternode_port(announce.addr.port()) {
            return Err(Rejection::silent(format!(
                "announce from {outpoint} uses port {} on {}",
                announce.addr.port(),
                self.config.network
            )));
        }

        let Some(existing) = st.entries.get(&outpoint) else {
            return Ok(());
        };
        // Legit duplicates are filtered by the seen cache before we get here.
        if existing.sig_time >= announce.sig_time {
            tracing::warn!(
                %outpoint,
                sig_time = announce.sig_time.as_secs(),
                existing = existing.sig_time.as_secs(),
                "announce is not newer than the stored one"
            );
            return Err(Rejection::silent(format!("stale announce for {outpoint}")));
        }
        if !existing.is_enabled() {
            return Ok(());
        }
        if existing.collateral_key == announce.collateral_key
            && !existing.is_broadcast_within(MIN_BROADCAST_SECONDS, now)
        {
            tracing::info!(addr = %announce.addr, "got updated masternode entry");
            if self.apply_newer_announce(st, announce) {
                if let Some(entry) = st.entries.get_mut(&outpoint) {
                    entry.check(false, now, self.chain.as_ref());
                    if entry.is_enabled() {
                        self.peers.relay(MxMessage::Announce(announce.clone()));
                    }
                }
            }
            self.sync.added_list_entry(announce.hash());
        }
        Ok(())
    }

    /// Admit a validated announce as a new entry.
    pub(crate) fn check_inputs_and_add(
        &self,
        st: &mut RegistryState,
        announce: &Announce,
    ) -> Result<AnnounceOutcome, Rejection> {
        let outpoint = announce.outpoint;
        let hash = announce.hash();

        if announce.last_ping.is_empty() {
            return Err(Rejection::silent(format!("announce from {outpoint} carries no ping")));
        }
        self.check_ping(st, &announce.last_ping, PingCheck::SigTimeOnly)?;

        if let Some(existing) = st.entries.get(&outpoint) {
            if existing.is_enabled() {
                return Ok(AnnounceOutcome::Known);
            }
            st.entries.remove(&outpoint);
        }

        let confirmed_at = match self.chain.utxo_status(&outpoint) {
            Err(_) => {
                // Not the announce's fault; let a later copy be checked again.
                self.forget_announce(st, &hash);
                return Err(Rejection::silent("chain is busy"));
            }
            Ok(UtxoStatus::Spent) => {
                return Err(Rejection::silent(format!("collateral {outpoint} is spent")));
            }
            Ok(UtxoStatus::Unspent { height }) => height,
        };

        if collateral_age(self.chain.as_ref(), &outpoint).unwrap_or(0) < MIN_CONFIRMATIONS {
            tracing::info!(%outpoint, min = MIN_CONFIRMATIONS, "collateral has too few confirmations");
            // We may be missing a few blocks; let this announce be checked again later.
            self.forget_announce(st, &hash);
            return Err(Rejection::silent(format!("collateral {outpoint} is too new")));
        }

        // The signature must not predate the block in which the collateral
        // reached the minimum confirmation depth.
        if let Some(height) = confirmed_at {
            if let Some(confirmed_time) = self.chain.block_time(height + MIN_CONFIRMATIONS - 1) {
                if confirmed_time > announce.sig_time {
                    tracing::warn!(
                        %outpoint,
                        sig_time = announce.sig_time.as_secs(),
                        confirmed_time = confirmed_time.as_secs(),
                        "announce signed before its collateral matured"
                    );
                    return Err(Rejection::silent(format!("back-dated announce for {outpoint}")));
                }
            }
        }

        tracing::info!(
            hash = %hash,
            addr = %announce.addr,
            %outpoint,
            sig_time = announce.sig_time.as_secs(),
            "got new masternode entry"
        );
        Self::add_locked(st, MasternodeEntry::from_announce(announce));

        let remote_activation = self.config.local_operational_key == Some(announce.operational_key)
            && announce.protocol_version == PROTOCOL_VERSION;

        let is_local = announce.addr.is_private() && self.config.network != NetworkId::Regtest;
        if !is_local {
            self.peers.relay(MxMessage::Announce(announce.clone()));
        }
        Ok(AnnounceOutcome::Added { remote_activation })
    }

    /// Update an existing entry from a newer announce, applying its ping
    /// when the ping validates.
    pub(crate) fn apply_newer_announce(&self, st: &mut RegistryState, announce: &Announce) -> bool {
        let updated = st
            .entries
            .get_mut(&announce.outpoint)
            .is_some_and(|entry| entry.update_from_announce(announce));
        if !updated {
            return false;
        }
        let ping = &announce.last_ping;
        let apply = ping.is_empty()
            || self
                .check_ping(st, ping, PingCheck::Apply { require_enabled: false })
                .is_ok();
        if apply {
            if let Some(entry) = st.entries.get_mut(&announce.outpoint) {
                entry.last_ping = ping.clone();
            }
            st.seen_pings.insert(ping.hash(), ping.clone());
        }
        true
    }

    /// Record an announce produced by the local masternode.
    pub fn register_local_announce(&self, announce: &Announce) {
        let hash = announce.hash();
        let mut st = self.lock();
        st.seen_pings
            .insert(announce.last_ping.hash(), announce.last_ping.clone());
        st.seen_announces.insert(hash, announce.clone());
        self.sync.added_list_entry(hash);
        tracing::info!(addr = %announce.addr, outpoint = %announce.outpoint, "updating masternode list from local announce");

        if st.entries.contains_key(&announce.outpoint) {
            self.apply_newer_announce(&mut st, announce);
        } else {
            Self::add_locked(&mut st, MasternodeEntry::from_announce(announce));
        }
    }

    fn forget_announce(&self, st: &mut RegistryState, hash: &mx_types::Hash256) {
        st.seen_announces.remove(hash);
        self.sync.forget_list_entry(hash);
    }
}

//! Applying pings to the registry.

use mx_messages::{MxMessage, PeerId, Ping, Rejection};
use mx_types::params::{MAX_TIME_SKEW, MIN_PING_SECONDS, PING_MAX_ANCHOR_AGE};
use mx_types::Timestamp;

use crate::registry::{PingOutcome, Registry, RegistryState};

/// How much validation a ping gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PingCheck {
    /// Timestamp window and, if the entry is known, the signature. Used for
    /// the ping embedded in an announce.
    SigTimeOnly,
    /// Full validation and, on success, apply it to the entry.
    Apply { require_enabled: bool },
}

impl Registry {
    /// Handle a ping received from `from`.
    ///
    /// A ping for an unknown entry, or one that failed with a misbehavior
    /// score, makes us ask the sender for the entry's announce.
    pub fn handle_ping(&self, from: PeerId, ping: &Ping) -> Result<PingOutcome, Rejection> {
        let hash = ping.hash();
        let mut st = self.lock();
        if st.seen_pings.contains_key(&hash) {
            return Ok(PingOutcome::AlreadySeen);
        }
        st.seen_pings.insert(hash, ping.clone());

        let rejection = match self.check_ping(
            &mut st,
            ping,
            PingCheck::Apply {
                require_enabled: true,
            },
        ) {
            Ok(()) => return Ok(PingOutcome::Accepted),
            Err(rejection) => rejection,
        };

        if rejection.is_misbehavior() {
            self.peers.misbehaving(from, rejection.dos);
        } else if st.entries.contains_key(&ping.outpoint) {
            return Err(rejection);
        }
        self.ask_for_locked(&mut st, from, ping.outpoint);
        Err(rejection)
    }

    pub(crate) fn check_ping(
        &self,
        st: &mut RegistryState,
        ping: &Ping,
        mode: PingCheck,
    ) -> Result<(), Rejection> {
        let now = self.now();
        if ping.sig_time > now.plus(MAX_TIME_SKEW) {
            return Err(Rejection::new(
                format!("ping from {} signed too far into the future", ping.outpoint),
                1,
            ));
        }
        if ping.sig_time <= now.minus(MAX_TIME_SKEW) {
            return Err(Rejection::new(
                format!("ping from {} signed too far into the past", ping.outpoint),
                1,
            ));
        }

        let require_enabled = match mode {
            PingCheck::SigTimeOnly => {
                return match st.entries.get(&ping.outpoint) {
                    Some(entry) if !ping.verify(&entry.operational_key) => Err(Rejection::new(
                        format!("bad ping signature from {}", ping.outpoint),
                        33,
                    )),
                    _ => Ok(()),
                };
            }
            PingCheck::Apply { require_enabled } => require_enabled,
        };

        tracing::trace!(outpoint = %ping.outpoint, hash = %ping.hash(), "new ping");
        let min_protocol = self.min_payment_protocol();
        let entry = match st.entries.get_mut(&ping.outpoint) {
            Some(entry) if entry.protocol_version >= min_protocol => entry,
            _ => {
                return Err(Rejection::silent(format!(
                    "no compatible masternode for ping {}",
                    ping.outpoint
                )))
            }
        };
        if require_enabled && !entry.is_enabled() {
            return Err(Rejection::silent(format!("masternode {} is not enabled", ping.outpoint)));
        }
        if entry.is_pinged_within(MIN_PING_SECONDS - 60, ping.sig_time) {
            tracing::trace!(outpoint = %ping.outpoint, "ping arrived too early");
            return Err(Rejection::silent(format!("ping from {} arrived too early", ping.outpoint)));
        }
        if !ping.verify(&entry.operational_key) {
            return Err(Rejection::new(
                format!("bad ping signature from {}", ping.outpoint),
                33,
            ));
        }

        // An unknown or stale anchor may just mean our own chain lags; never penalize.
        let tip_height = self.chain.tip().map(|t| t.height).unwrap_or(0);
        match self.chain.height_of(&ping.block_hash) {
            Some(height) if height + PING_MAX_ANCHOR_AGE < tip_height => {
                tracing::debug!(outpoint = %ping.outpoint, anchor = %ping.block_hash, "ping anchor is too old");
                return Err(Rejection::silent(format!(
                    "ping from {} is anchored too far back",
                    ping.outpoint
                )));
            }
            Some(_) => {}
            None => {
                tracing::debug!(outpoint = %ping.outpoint, anchor = %ping.block_hash, "ping anchor is unknown");
                return Err(Rejection::silent(format!(
                    "ping from {} has an unknown anchor",
                    ping.outpoint
                )));
            }
        }

        entry.last_ping = ping.clone();
        let announce_hash = entry.announce_hash();
        if let Some(seen) = st.seen_announces.get_mut(&announce_hash) {
            seen.last_ping = ping.clone();
        }
        entry.check(true, now, self.chain.as_ref());
        if !entry.is_enabled() {
            return Err(Rejection::silent(format!(
                "masternode {} is not enabled after ping",
                ping.outpoint
            )));
        }

        tracing::trace!(outpoint = %ping.outpoint, "ping accepted");
        self.peers.relay(MxMessage::Ping(ping.clone()));
        Ok(())
    }

    /// Record a ping produced by the local masternode and relay it.
    pub fn apply_local_ping(&self, ping: &Ping) -> bool {
        let mut st = self.lock();
        let Some(entry) = st.entries.get_mut(&ping.outpoint) else {
            return false;
        };
        entry.last_ping = ping.clone();
        let announce_hash = entry.announce_hash();
        st.seen_pings.insert(ping.hash(), ping.clone());
        if let Some(seen) = st.seen_announces.get_mut(&announce_hash) {
            seen.last_ping = ping.clone();
        }
        self.peers.relay(MxMessage::Ping(ping.clone()));
        true
    }

    /// Last accepted ping time of `outpoint`.
    pub fn last_ping_time(&self, outpoint: &mx_types::Outpoint) -> Option<Timestamp> {
        self.lock()
            .entries
            .get(outpoint)
            .filter(|e| !e.last_ping.is_empty())
            .map(|e| e.last_ping.sig_time)
    }
}

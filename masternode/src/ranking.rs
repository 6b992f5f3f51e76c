//! Ranks and payment-queue selection.

use mx_types::params::SCORE_LOOKBACK;
use mx_types::{Outpoint, Timestamp};

use crate::collaborators::PaymentSchedule;
use crate::entry::MasternodeEntry;
use crate::registry::{Registry, RegistryState};
use crate::score::{anchor_hash, rank_order, score_for_anchor, tie_break, U256};

/// Payment age given to entries never seen paid, before the tie-break offset.
pub const NEVER_PAID_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Spread of the deterministic last-paid offset.
const LAST_PAID_OFFSET_SPAN: u32 = 150;

/// Queue pick for a height.
#[derive(Clone, Debug)]
pub struct QueueSelection {
    pub winner: Option<MasternodeEntry>,
    /// Entries that passed the eligibility filters.
    pub eligible: usize,
}

impl Registry {
    /// Scores of eligible entries for `height`, best first. `None` when the
    /// anchor block is unknown.
    fn ranked(
        &self,
        st: &mut RegistryState,
        height: u64,
        min_protocol: u32,
        only_active: bool,
    ) -> Option<Vec<(U256, Outpoint)>> {
        let anchor = anchor_hash(self.chain.as_ref(), height)?;
        let now = self.now();
        let mut scores: Vec<(U256, Outpoint)> = st
            .entries
            .values_mut()
            .filter(|e| e.protocol_version >= min_protocol)
            .filter_map(|e| {
                if only_active {
                    e.check(false, now, self.chain.as_ref());
                    if !e.is_enabled() {
                        return None;
                    }
                }
                Some((score_for_anchor(&anchor, &e.outpoint), e.outpoint))
            })
            .collect();
        scores.sort_by(rank_order);
        Some(scores)
    }

    /// 1-based rank of `outpoint` at `height`; `None` if unranked or the
    /// block is unknown.
    pub fn rank(&self, outpoint: &Outpoint, height: u64, min_protocol: u32, only_active: bool) -> Option<usize> {
        let mut st = self.lock();
        self.ranked(&mut st, height, min_protocol, only_active)?
            .iter()
            .position(|(_, op)| op == outpoint)
            .map(|i| i + 1)
    }

    /// Every enabled entry with its 1-based rank at `height`.
    pub fn ranks(&self, height: u64, min_protocol: u32) -> Vec<(usize, MasternodeEntry)> {
        let mut st = self.lock();
        let Some(ranked) = self.ranked(&mut st, height, min_protocol, true) else {
            return Vec::new();
        };
        ranked
            .iter()
            .enumerate()
            .filter_map(|(i, (_, op))| st.entries.get(op).map(|e| (i + 1, e.clone())))
            .collect()
    }

    pub fn by_rank(&self, rank: usize, height: u64, min_protocol: u32, only_active: bool) -> Option<MasternodeEntry> {
        let mut st = self.lock();
        let ranked = self.ranked(&mut st, height, min_protocol, only_active)?;
        let (_, outpoint) = ranked.get(rank.checked_sub(1)?)?;
        st.entries.get(outpoint).cloned()
    }

    /// Enabled entry with the highest compact score at `height`; the first
    /// one in outpoint order wins ties.
    pub fn current(&self, height: u64, min_protocol: u32) -> Option<MasternodeEntry> {
        let anchor = anchor_hash(self.chain.as_ref(), height)?;
        let now = self.now();
        let mut st = self.lock();
        let mut best: Option<(u32, Outpoint)> = None;
        for entry in st.entries.values_mut() {
            entry.check(false, now, self.chain.as_ref());
            if entry.protocol_version < min_protocol || !entry.is_enabled() {
                continue;
            }
            let score = score_for_anchor(&anchor, &entry.outpoint).compact();
            if score > best.map(|(s, _)| s).unwrap_or(0) {
                best = Some((score, entry.outpoint));
            }
        }
        best.and_then(|(_, op)| st.entries.get(&op).cloned())
    }

    /// Deterministically pick the masternode to pay at `height`.
    ///
    /// Eligible entries are sorted by time since their last payment; the
    /// best scorer among the oldest `1 / queue_sample_divisor` of the network
    /// wins. When too few entries are old enough (the network is upgrading),
    /// the signature-age filter is dropped.
    pub fn next_in_queue(&self, height: u64, schedule: &dyn PaymentSchedule) -> QueueSelection {
        let mut st = self.lock();
        self.next_in_queue_locked(&mut st, height, true, schedule)
    }

    fn next_in_queue_locked(
        &self,
        st: &mut RegistryState,
        height: u64,
        filter_sig_time: bool,
        schedule: &dyn PaymentSchedule,
    ) -> QueueSelection {
        let now = self.now();
        let min_protocol = self.min_payment_protocol();
        let enabled = self.count_enabled_locked(st, None);
        let cycle_seconds = enabled as f64 * self.config.tuning.queue_cycle_minutes * 60.0;

        let mut candidates: Vec<(u64, Outpoint)> = Vec::new();
        for entry in st.entries.values_mut() {
            entry.check(false, now, self.chain.as_ref());
            if !entry.is_enabled() || entry.protocol_version < min_protocol {
                continue;
            }
            // Already scheduled in the next few blocks.
            if schedule.is_scheduled(&mx_crypto::payee_script(&entry.collateral_key), height) {
                continue;
            }
            // Too new; wait a cycle.
            if filter_sig_time && entry.sig_time.as_secs() as f64 + cycle_seconds > now.as_secs() as f64 {
                continue;
            }
            // As many confirmations as there are masternodes.
            if entry.input_age(self.chain.as_ref()) < enabled as u64 {
                continue;
            }
            let age = self.seconds_since_payment(entry, enabled, now, schedule);
            candidates.push((age, entry.outpoint));
        }

        let eligible = candidates.len();
        if filter_sig_time && eligible < enabled / 3 {
            return self.next_in_queue_locked(st, height, false, schedule);
        }

        candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let sample = enabled / self.config.tuning.queue_sample_divisor.max(1) as usize;
        let anchor = anchor_hash(self.chain.as_ref(), height.saturating_sub(SCORE_LOOKBACK));
        let mut best: Option<(U256, Outpoint)> = None;
        for (checked, (_, outpoint)) in candidates.iter().enumerate() {
            let score = anchor
                .as_ref()
                .map(|a| score_for_anchor(a, outpoint))
                .unwrap_or(U256::ZERO);
            if score > best.map(|(s, _)| s).unwrap_or(U256::ZERO) {
                best = Some((score, *outpoint));
            }
            if checked + 1 >= sample {
                break;
            }
        }

        QueueSelection {
            winner: best.and_then(|(_, op)| st.entries.get(&op).cloned()),
            eligible,
        }
    }

    /// Seconds since `entry` was last paid. Entries never seen paid get a
    /// deterministic value beyond [`NEVER_PAID_SECONDS`].
    pub(crate) fn seconds_since_payment(
        &self,
        entry: &MasternodeEntry,
        enabled: usize,
        now: Timestamp,
        schedule: &dyn PaymentSchedule,
    ) -> u64 {
        let last_paid = self.last_paid(entry, enabled, schedule);
        let since = now.as_secs() as i64 - last_paid as i64;
        if since < NEVER_PAID_SECONDS as i64 {
            return since.max(0) as u64;
        }
        NEVER_PAID_SECONDS + tie_break(&entry.outpoint, entry.sig_time) as u64
    }

    /// Time of the most recent block within `1.25 × enabled` blocks of the
    /// tip whose tally gives `entry` at least two votes, plus a
    /// deterministic offset below 150 seconds. `0` if none.
    pub(crate) fn last_paid(&self, entry: &MasternodeEntry, enabled: usize, schedule: &dyn PaymentSchedule) -> u64 {
        let Some(tip) = self.chain.tip() else {
            return 0;
        };
        let payee = mx_crypto::payee_script(&entry.collateral_key);
        let offset = (tie_break(&entry.outpoint, entry.sig_time) % LAST_PAID_OFFSET_SPAN) as u64;
        let max_blocks = enabled as u64 * 5 / 4;

        let mut height = tip.height;
        let mut scanned = 0;
        while height > 0 {
            if scanned >= max_blocks {
                return 0;
            }
            scanned += 1;
            if schedule.has_payee_with_votes(height, &payee, 2) {
                return self
                    .chain
                    .block_time(height)
                    .map(|t| t.as_secs() + offset)
                    .unwrap_or(0);
            }
            height -= 1;
        }
        0
    }
}

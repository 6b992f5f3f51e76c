//! Protocol constants and the tunable consensus parameters.
//!
//! Everything in here must match across nodes; changing a value is a
//! network upgrade.

use serde::{Deserialize, Serialize};

/// Base units per coin.
pub const COIN: u64 = 100_000_000;

/// Exact collateral a masternode must lock.
pub const MASTERNODE_COLLATERAL: u64 = 1000 * COIN;

// ── Protocol versions ───────────────────────────────────────────────────

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u32 = 70206;

/// Announces below this version are signed over raw key bytes.
pub const LEGACY_ANNOUNCE_CUTOFF: u32 = 70201;

/// Minimum masternode protocol accepted for payments before the upgrade spork.
pub const MIN_PAYMENT_PROTO_V1: u32 = 70205;

/// Minimum masternode protocol accepted for payments after the upgrade spork.
pub const MIN_PAYMENT_PROTO_V2: u32 = 70206;

/// Peers below this version are ignored for payment votes.
pub const MIN_WINNER_PEER_PROTO: u32 = 70205;

/// Peers below this version are not asked for governance data during sync.
pub const MIN_GOVERNANCE_PEER_PROTO: u32 = 70205;

// ── Masternode timing (seconds) ─────────────────────────────────────────

pub const MIN_CONFIRMATIONS: u64 = 15;
pub const MIN_PING_SECONDS: u64 = 10 * 60;
pub const MIN_BROADCAST_SECONDS: u64 = 5 * 60;
pub const PING_SECONDS: u64 = 5 * 60;
pub const EXPIRATION_SECONDS: u64 = 65 * 60;
pub const REMOVAL_SECONDS: u64 = 75 * 60;
pub const CHECK_SECONDS: u64 = 5;
pub const DUMP_SECONDS: u64 = 15 * 60;
pub const LIST_REQUEST_SECONDS: u64 = 3 * 60 * 60;

/// Maximum clock skew tolerated on signed message timestamps.
pub const MAX_TIME_SKEW: u64 = 60 * 60;

/// A ping is signed over the hash of the block this many blocks behind the tip.
pub const PING_ANCHOR_DEPTH: u64 = 12;

/// Pings anchored further back than this are rejected.
pub const PING_MAX_ANCHOR_AGE: u64 = 24;

// ── Payments ────────────────────────────────────────────────────────────

/// Votes a payee needs before it is enforced.
pub const SIGNATURES_REQUIRED: u32 = 6;

/// Number of top-ranked masternodes that vote on each block.
pub const SIGNATURES_TOTAL: u32 = 10;

/// Weight of a vote cast by the reference node.
pub const REFERENCE_NODE_WEIGHT: u32 = 100;

/// Scores for a payment vote are taken this many blocks before the paid height.
pub const SCORE_LOOKBACK: u64 = 100;

/// How far ahead `is_scheduled` looks.
pub const SCHEDULE_LOOKAHEAD: u64 = 8;

/// Empirically tuned consensus parameters.
///
/// Defaults reproduce the values the network runs with. They are exposed so
/// they are documented in one place, not so operators can diverge from peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusTuning {
    /// Votes are accepted back to `tip - factor * enabled_count`.
    pub vote_window_factor: f64,
    /// Votes are accepted up to `tip + blocks`.
    pub vote_window_ahead: u64,
    /// Queue selection scores the oldest `enabled / divisor` entries.
    pub queue_sample_divisor: u64,
    /// Entries younger than `enabled * minutes * 60` seconds wait a cycle.
    pub queue_cycle_minutes: f64,
    /// Payment history is kept for at least this many blocks.
    pub payments_history_floor: u64,
}

impl Default for ConsensusTuning {
    fn default() -> Self {
        Self {
            vote_window_factor: 1.25,
            vote_window_ahead: 20,
            queue_sample_divisor: 10,
            queue_cycle_minutes: 2.6,
            payments_history_floor: 1000,
        }
    }
}

impl ConsensusTuning {
    /// `factor * enabled_count`, truncated like the network does.
    pub fn vote_window_back(&self, enabled_count: usize) -> u64 {
        (enabled_count as f64 * self.vote_window_factor) as u64
    }
}

//! Interfaces the registry consumes from services built on top of it.
//!
//! Both are implemented in downstream crates (payments, sync) and handed in
//! as trait objects so the registry never depends on them directly.

use mx_types::params::{MIN_PAYMENT_PROTO_V1, MIN_PAYMENT_PROTO_V2};
use mx_types::{Hash256, Script, Spork, Sporks};

/// Progress reporting into the sync state machine.
///
/// Calls come from message handlers on arbitrary threads and must return
/// immediately.
pub trait SyncProgress: Send + Sync {
    /// A list entry (announce) was seen; counts toward list-sync progress.
    fn added_list_entry(&self, hash: Hash256);
    /// The announce was evicted and may be counted again when it returns.
    fn forget_list_entry(&self, hash: &Hash256);
    fn added_winner(&self, hash: Hash256);
    fn forget_winner(&self, hash: &Hash256);
    /// Every sync stage has completed.
    fn is_synced(&self) -> bool;
    fn is_blockchain_synced(&self) -> bool;
}

/// What queue selection needs to know about the payment-vote tallies.
pub trait PaymentSchedule: Send + Sync {
    /// Whether `payee` leads the tally of any height in the next few blocks,
    /// ignoring `not_height`.
    fn is_scheduled(&self, payee: &Script, not_height: u64) -> bool;

    /// Whether `payee` has at least `votes` votes at `height`.
    fn has_payee_with_votes(&self, height: u64, payee: &Script, votes: u32) -> bool;
}

/// Lowest masternode protocol version that is still paid.
pub fn min_payment_protocol(sporks: &dyn Sporks) -> u32 {
    if sporks.is_active(Spork::PayUpdatedNodes) {
        MIN_PAYMENT_PROTO_V2
    } else {
        MIN_PAYMENT_PROTO_V1
    }
}

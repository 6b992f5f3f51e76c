//! Payment consensus for the masternode network.
//!
//! The ten best-scored masternodes sign a vote naming the payee of each
//! upcoming block. Votes are tallied per height and a block must pay the
//! payee that gathered six of them.
//!
//! ## Module overview
//!
//! - [`payments`]: Vote handling, our own votes, coinbase fill and validation.
//! - [`tally`]: Per-height payee tallies.
//! - [`error`]: Payment error types.

pub mod error;
pub mod payments;
pub mod tally;

#[cfg(test)]
mod test_support;

pub use error::PaymentError;
pub use payments::{
    payments_cache, PaymentTables, Payments, VoteOutcome, PAYMENTS_CACHE_FILE, PAYMENTS_CACHE_MAGIC,
};
pub use tally::{BlockPayees, PayeeVotes};

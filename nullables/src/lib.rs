//! Test doubles for the collaborators the masternode layer consumes.
//!
//! Each one is thread-safe, fully in memory and steered by the test:
//! [`NullClock`] is set and advanced by hand, [`NullChain`] holds a block
//! list and UTXO set, [`NullSporks`] flips switches and [`NullPeers`]
//! records what would have gone out on the wire.

pub mod chain;
pub mod clock;
pub mod peers;
pub mod sporks;

pub use chain::NullChain;
pub use clock::NullClock;
pub use peers::NullPeers;
pub use sporks::NullSporks;

//! Checksummed flat-file persistence for masternode caches.
//!
//! The registry and the payment-vote tables are dumped to disk so a restart
//! does not need a full network resync. Both files share one frame:
//!
//! ```text
//! [magic string][4-byte network magic][bincode payload][32-byte Blake2b of everything before]
//! ```
//!
//! A file that fails any check is never trusted; callers fall back to an
//! empty cache and rebuild from the network.

pub mod error;
pub mod flat_file;

pub use error::{ReadResult, StoreError};
pub use flat_file::{DumpOutcome, FlatFileStore};

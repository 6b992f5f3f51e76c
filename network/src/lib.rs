//! Masternode data sync.
//!
//! A fresh node pulls sporks, the masternode list, payment votes and
//! governance data from its peers, one stage at a time. Until the machine
//! reports [`SyncStage::Finished`] the node does not trust its own view:
//! it neither penalizes peers for votes it cannot verify nor enforces
//! block payees.
//!
//! ## Module overview
//!
//! - [`stage`]: Stage order, wire codes and status strings.
//! - [`status`]: Progress tracking and the blockchain-synced oracle.
//! - [`driver`]: The periodic stage machine that requests data from peers.
//! - [`error`]: Sync error types.

pub mod driver;
pub mod error;
pub mod stage;
pub mod status;

pub use driver::SyncDriver;
pub use error::SyncError;
pub use stage::{SyncStage, FAILURE_COOLDOWN, SYNC_THRESHOLD, SYNC_TIMEOUT};
pub use status::{AssetCounts, SyncState, SyncStatus};

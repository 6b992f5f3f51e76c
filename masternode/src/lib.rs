//! The masternode registry.
//!
//! - [`MasternodeEntry`]: one collateral-backed node and its lifecycle
//! - [`Registry`]: every known entry, the announce/ping seen-caches and the
//!   list-request bookkeeping, behind a single lock
//! - [`score`]: deterministic per-block scores, ranks and the payment queue
//! - [`ActiveMasternode`]: the node's own entry when it runs as a masternode
//!
//! Payment consensus and sync sit on top of the registry and talk back to it
//! through [`SyncProgress`] and [`PaymentSchedule`].

pub mod active;
pub mod announce;
pub mod collaborators;
pub mod entry;
pub mod error;
pub mod ping;
pub mod ranking;
pub mod registry;
pub mod score;

#[cfg(test)]
mod test_support;

pub use active::{ActiveConfig, ActiveMasternode, ActiveStatus, LocalCollateral};
pub use collaborators::{min_payment_protocol, PaymentSchedule, SyncProgress};
pub use entry::{collateral_age, MasternodeEntry, MasternodeState};
pub use error::{ActiveError, RegistryError};
pub use ranking::{QueueSelection, NEVER_PAID_SECONDS};
pub use registry::{
    registry_cache, AnnounceOutcome, PingOutcome, Registry, RegistryConfig, RegistryState,
    SweepReport, REGISTRY_CACHE_FILE, REGISTRY_CACHE_MAGIC,
};
pub use score::{anchor_hash, calculate_score, U256};

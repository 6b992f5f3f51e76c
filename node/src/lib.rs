//! Masternode service: the layer between the host node and the masternode
//! crates.
//!
//! ## Module overview
//!
//! - [`config`]: TOML configuration, including the local masternode keys
//!   and the consensus tuning table
//! - [`node`]: message dispatch, chain tip handling and the maintenance loop
//! - [`metrics`]: Prometheus counters and gauges
//! - [`logging`]: `tracing` subscriber setup
//! - [`shutdown`]: signal handling for the maintenance loop
//! - [`sporks`]: configuration-pinned spork values

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod sporks;

pub use config::{NodeConfig, SporkConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{Collaborators, MasternodeNode, NodeStatus};
pub use shutdown::{ShutdownController, ShutdownListener, StopReason};
pub use sporks::StaticSporks;

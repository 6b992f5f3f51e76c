//! Fundamental types for the masternode layer.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! hashes, collateral outpoints, keys, scripts, addresses, timestamps, network
//! identifiers and the protocol constants that every node must agree on.

pub mod address;
pub mod chain;
pub mod error;
pub mod hash;
pub mod keys;
pub mod network;
pub mod outpoint;
pub mod params;
pub mod script;
pub mod time;

pub use address::NetAddress;
pub use chain::{ChainBusy, ChainOracle, ChainTip, Spork, Sporks, UtxoStatus};
pub use error::TypesError;
pub use hash::Hash256;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use outpoint::Outpoint;
pub use params::ConsensusTuning;
pub use script::{CoinbaseTx, Script, TxOut};
pub use time::{Clock, SystemClock, Timestamp};

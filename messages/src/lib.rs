//! Network message types for masternode node-to-node communication.
//!
//! - [`Ping`]: signed liveness beacon anchored to a recent block
//! - [`Announce`]: signed registration of a collateral outpoint, address and keys
//! - [`PaymentVote`]: one masternode's choice of payee for a block height
//! - [`MxMessage`]: the envelope every message travels in
//! - [`PeerTransport`]: what this layer needs from the P2P transport

pub mod announce;
pub mod envelope;
pub mod error;
pub mod outcome;
pub mod peer;
pub mod ping;
pub mod vote;

pub use announce::{Announce, AnnounceEncoding};
pub use envelope::{MxMessage, SyncAsset};
pub use error::MessageError;
pub use outcome::Rejection;
pub use peer::{PeerId, PeerInfo, PeerTransport};
pub use ping::Ping;
pub use vote::PaymentVote;

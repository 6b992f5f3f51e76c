//! The message envelope.

use mx_types::Outpoint;
use serde::{Deserialize, Serialize};

use crate::{Announce, MessageError, PaymentVote, Ping};

/// Largest encoded message accepted from a peer.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Asset a `StatusCount` message reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncAsset {
    List,
    Winners,
    Proposals,
    Finals,
}

/// Every masternode-layer message exchanged between peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MxMessage {
    Announce(Announce),
    Ping(Ping),
    /// Ask for one entry, or the full list when the outpoint is [`Outpoint::NULL`].
    RequestList(Outpoint),
    PaymentVote(PaymentVote),
    /// Ask for recent payment votes; the count is a hint of how many blocks back.
    RequestPaymentSync(u32),
    /// How many items of `asset` the sender just sent us.
    StatusCount { asset: SyncAsset, count: u32 },
    GetSporks,
    /// Governance vote sync; answered by the governance subsystem.
    RequestGovernanceSync,
}

impl MxMessage {
    /// Short command name used in logs and fulfilled-request flags.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Announce(_) => "mnb",
            Self::Ping(_) => "mnp",
            Self::RequestList(_) => "dseg",
            Self::PaymentVote(_) => "mnw",
            Self::RequestPaymentSync(_) => "mnget",
            Self::StatusCount { .. } => "ssc",
            Self::GetSporks => "getsporks",
            Self::RequestGovernanceSync => "mnvs",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        bincode::serialize(self).map_err(|e| MessageError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(MessageError::TooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        bincode::deserialize(bytes).map_err(|e| MessageError::Decode(e.to_string()))
    }
}

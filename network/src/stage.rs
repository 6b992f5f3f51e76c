//! Sync stages and their wire codes.

use std::fmt;

use mx_messages::SyncAsset;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Seconds between stage checks, and the unit of every stage deadline.
pub const SYNC_TIMEOUT: u64 = 5;

/// Responses needed before a quiet stage may advance. Also caps how often
/// one item counts as new.
pub const SYNC_THRESHOLD: u32 = 2;

/// Seconds spent in `Failed` before the machine starts over.
pub const FAILURE_COOLDOWN: u64 = 60;

/// Stages of masternode data sync, strictly ordered. `Failed` sits outside
/// the order and is only left through a reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyncStage {
    Initial,
    Sporks,
    List,
    Winners,
    Governance,
    Failed,
    Finished,
}

impl SyncStage {
    pub fn code(&self) -> u32 {
        match self {
            Self::Initial => 0,
            Self::Sporks => 1,
            Self::List => 2,
            Self::Winners => 3,
            Self::Governance => 4,
            Self::Failed => 998,
            Self::Finished => 999,
        }
    }

    /// Stage that follows a completed one.
    pub fn next(&self) -> Self {
        match self {
            Self::Initial | Self::Failed => Self::Sporks,
            Self::Sporks => Self::List,
            Self::List => Self::Winners,
            Self::Winners => Self::Governance,
            Self::Governance | Self::Finished => Self::Finished,
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Initial => "Synchronization pending...",
            Self::Sporks => "Synchronizing sporks...",
            Self::List => "Synchronizing masterxs...",
            Self::Winners => "Synchronizing masterx winners...",
            Self::Governance => "Synchronizing evolutions...",
            Self::Failed => "Synchronization failed",
            Self::Finished => "Synchronization finished",
        }
    }

    /// Whether a `StatusCount` for `asset` belongs to this stage.
    pub fn counts(&self, asset: SyncAsset) -> bool {
        matches!(
            (self, asset),
            (Self::List, SyncAsset::List)
                | (Self::Winners, SyncAsset::Winners)
                | (Self::Governance, SyncAsset::Proposals | SyncAsset::Finals)
        )
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

impl TryFrom<u32> for SyncStage {
    type Error = SyncError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Initial,
            1 => Self::Sporks,
            2 => Self::List,
            3 => Self::Winners,
            4 => Self::Governance,
            998 => Self::Failed,
            999 => Self::Finished,
            other => return Err(SyncError::UnknownStage(other)),
        })
    }
}

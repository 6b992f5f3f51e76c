use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("unknown sync stage code {0}")]
    UnknownStage(u32),

    #[error("sync failed {failures} time(s), retrying after the cooldown")]
    Failed { failures: u32 },
}

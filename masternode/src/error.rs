use mx_store::StoreError;
use mx_types::Outpoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry lock is held elsewhere; the operation is deferred to the next tick.
    #[error("registry is busy")]
    Busy,

    #[error("unknown masternode: {0}")]
    UnknownMasternode(Outpoint),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Local masternode activation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActiveError {
    #[error("masternode is not started")]
    NotStarted,

    #[error("too early to send a ping, last one was {0}s ago")]
    PingTooEarly(u64),

    #[error("chain tip is unavailable")]
    NoChain,

    #[error("collateral key is not configured")]
    NoCollateralKey,

    #[error("masternode not found in the registry: {0}")]
    NotRegistered(Outpoint),
}

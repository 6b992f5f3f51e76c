use mx_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The chain or the vote tables are locked elsewhere; retried on the next tick.
    #[error("payment tables are busy")]
    Busy,

    #[error("not ranked among the voting masternodes at height {0}")]
    NotRanked(u64),

    #[error("rank {rank} is outside the voting quorum")]
    OutsideQuorum { rank: usize },

    #[error("already voted for height {0}")]
    AlreadyVoted(u64),

    #[error("no masternode is eligible for payment at height {0}")]
    NoPayee(u64),

    #[error("vote for height {0} was not recorded")]
    NotRecorded(u64),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

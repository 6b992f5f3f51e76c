use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("registry error: {0}")]
    Registry(#[from] mx_masternode::RegistryError),

    #[error("payment error: {0}")]
    Payment(#[from] mx_consensus::PaymentError),

    #[error("sync error: {0}")]
    Sync(#[from] mx_network::SyncError),

    #[error("store error: {0}")]
    Store(#[from] mx_store::StoreError),

    #[error("message error: {0}")]
    Message(#[from] mx_messages::MessageError),

    #[error("masternode error: {0}")]
    Active(#[from] mx_masternode::ActiveError),

    #[error("key error: {0}")]
    Crypto(#[from] mx_crypto::CryptoError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("status encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

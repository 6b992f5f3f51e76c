use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key encoding: {0}")]
    InvalidKey(String),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

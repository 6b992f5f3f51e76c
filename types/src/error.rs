//! Parse errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid outpoint: {0}")]
    InvalidOutpoint(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("invalid network address: {0}")]
    InvalidAddress(String),
}

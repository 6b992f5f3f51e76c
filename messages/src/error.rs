use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message encoding failed: {0}")]
    Encode(String),

    #[error("message decoding failed: {0}")]
    Decode(String),

    #[error("message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

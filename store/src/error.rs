use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("refusing to overwrite unreadable cache file: {0}")]
    Corruption(ReadResult),
}

/// Outcome of reading a cache file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ReadResult {
    #[error("ok")]
    Ok,
    #[error("file missing or unreadable")]
    FileError,
    #[error("checksum could not be read")]
    HashReadError,
    #[error("checksum mismatch")]
    IncorrectHash,
    #[error("magic message mismatch")]
    IncorrectMagicMessage,
    #[error("network magic mismatch")]
    IncorrectMagicNumber,
    #[error("payload has an invalid format")]
    IncorrectFormat,
}

impl ReadResult {
    /// Whether a dump may overwrite a file that read back with this result.
    ///
    /// A missing file or a payload in an outdated format gets recreated; any
    /// other failure is left for the operator to inspect.
    pub fn allows_overwrite(&self) -> bool {
        matches!(self, Self::Ok | Self::FileError | Self::IncorrectFormat)
    }
}

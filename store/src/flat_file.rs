//! The checksummed cache frame.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ReadResult, StoreError};

const CHECKSUM_LEN: usize = 32;

/// What [`FlatFileStore::dump`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpOutcome {
    /// The previous file was valid and has been replaced.
    Replaced,
    /// There was no file (or it held an outdated format); a new one was written.
    Recreated,
}

/// One cache file on disk.
#[derive(Clone, Debug)]
pub struct FlatFileStore {
    path: PathBuf,
    magic_message: String,
    network_magic: [u8; 4],
}

impl FlatFileStore {
    pub fn new(path: impl Into<PathBuf>, magic_message: &str, network_magic: [u8; 4]) -> Self {
        Self {
            path: path.into(),
            magic_message: magic_message.to_string(),
            network_magic,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame `value` into bytes without touching the filesystem.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        let mut data = bincode::serialize(&self.magic_message)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        data.extend_from_slice(&self.network_magic);
        let payload =
            bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        data.extend_from_slice(&payload);
        let checksum = mx_crypto::blake2b_256(&data);
        data.extend_from_slice(&checksum);
        Ok(data)
    }

    /// Check and unframe bytes produced by [`encode`](Self::encode).
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ReadResult> {
        if bytes.len() < CHECKSUM_LEN {
            return Err(ReadResult::HashReadError);
        }
        let (data, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if mx_crypto::blake2b_256(data) != checksum {
            return Err(ReadResult::IncorrectHash);
        }

        let mut cursor = data;
        let magic_message: String =
            bincode::deserialize_from(&mut cursor).map_err(|_| ReadResult::IncorrectFormat)?;
        if magic_message != self.magic_message {
            return Err(ReadResult::IncorrectMagicMessage);
        }
        if cursor.len() < 4 {
            return Err(ReadResult::IncorrectFormat);
        }
        let (magic, payload) = cursor.split_at(4);
        if magic != self.network_magic {
            return Err(ReadResult::IncorrectMagicNumber);
        }
        bincode::deserialize(payload).map_err(|_| ReadResult::IncorrectFormat)
    }

    /// Write `value` unconditionally.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let start = Instant::now();
        let bytes = self.encode(value)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, bytes)?;
        tracing::info!(
            path = %self.path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "written cache file"
        );
        Ok(())
    }

    /// Read and verify the file.
    pub fn read<T: DeserializeOwned>(&self) -> Result<T, ReadResult> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "cannot open cache file");
                return Err(ReadResult::FileError);
            }
        };
        let result = self.decode(&bytes);
        if let Err(reason) = &result {
            tracing::warn!(path = %self.path.display(), %reason, "cache file rejected");
        }
        result
    }

    /// Verify the current file, then overwrite it with `value`.
    ///
    /// `T` is the type stored in the file; the existing file is decoded as
    /// `T` to decide whether it may be replaced.
    pub fn dump<T: Serialize + DeserializeOwned>(
        &self,
        value: &T,
    ) -> Result<DumpOutcome, StoreError> {
        let verdict = match self.read::<T>() {
            Ok(_) => ReadResult::Ok,
            Err(reason) => reason,
        };
        if !verdict.allows_overwrite() {
            tracing::warn!(
                path = %self.path.display(),
                reason = %verdict,
                "cache file format is unknown or invalid, please fix it manually"
            );
            return Err(StoreError::Corruption(verdict));
        }
        self.write(value)?;
        Ok(if verdict == ReadResult::Ok {
            DumpOutcome::Replaced
        } else {
            DumpOutcome::Recreated
        })
    }
}

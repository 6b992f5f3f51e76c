//! Blake2b hashing for messages, scores and key ids.

use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Digest};
use mx_types::{Hash256, PublicKey, Script};

type Blake2b256 = Blake2b<U32>;
type Blake2b160 = Blake2b<U20>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// [`blake2b_256_multi`] wrapped as a [`Hash256`].
pub fn hash_parts(parts: &[&[u8]]) -> Hash256 {
    Hash256::new(blake2b_256_multi(parts))
}

/// 160-bit key id of a public key.
pub fn key_id(public_key: &PublicKey) -> [u8; 20] {
    let mut hasher = Blake2b160::new();
    hasher.update(public_key.as_bytes());
    let result = hasher.finalize();
    let mut output = [0u8; 20];
    output.copy_from_slice(&result);
    output
}

/// Script that pays the holder of `public_key`.
pub fn payee_script(public_key: &PublicKey) -> Script {
    Script::pay_to_key_id(&key_id(public_key))
}

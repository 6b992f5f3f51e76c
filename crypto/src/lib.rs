//! Cryptographic primitives for the masternode layer.
//!
//! - **Ed25519** for signing and verifying announces, pings and payment votes
//! - **Blake2b** for message hashes, scores, cache checksums and key ids
//! - Pay-to-key-id script derivation for masternode payees

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, hash_parts, key_id, payee_script};
pub use keys::{
    generate_keypair, is_valid_public_key, keypair_from_hex, keypair_from_private,
    keypair_from_seed, public_from_private,
};
pub use sign::{sign_message, verify_signature};

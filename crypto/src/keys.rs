//! Ed25519 key generation and parsing.

use ed25519_dalek::{SigningKey, VerifyingKey};
use mx_types::{KeyPair, PrivateKey, PublicKey};

use crate::CryptoError;

/// Generate a new Ed25519 key pair from the operating system's entropy source.
pub fn generate_keypair() -> Result<KeyPair, CryptoError> {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(keypair_from_seed(&seed))
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Parse a hex-encoded 32-byte seed, as stored in node configuration.
pub fn keypair_from_hex(seed_hex: &str) -> Result<KeyPair, CryptoError> {
    let bytes = hex::decode(seed_hex.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32 bytes".to_string()))?;
    Ok(keypair_from_seed(&seed))
}

/// Whether the bytes decode to a usable Ed25519 point.
pub fn is_valid_public_key(public_key: &PublicKey) -> bool {
    VerifyingKey::from_bytes(&public_key.0).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_keypair() {
        let kp = generate_keypair().unwrap();
        assert_ne!(kp.public.0, [0u8; 32]);
        assert!(is_valid_public_key(&kp.public));
    }

    #[test]
    fn keypair_from_private_roundtrip() {
        let kp1 = keypair_from_seed(&[3u8; 32]);
        let kp2 = keypair_from_private(PrivateKey(kp1.private.0));
        assert_eq!(kp1.public, kp2.public);
    }

    #[test]
    fn keypair_from_seed_deterministic() {
        let kp1 = keypair_from_seed(&[42u8; 32]);
        let kp2 = keypair_from_seed(&[42u8; 32]);
        assert_eq!(kp1.public, kp2.public);
        assert_eq!(kp1.private.0, kp2.private.0);
    }

    #[test]
    fn keypair_from_hex_matches_seed() {
        let hex_seed = "07".repeat(32);
        let kp = keypair_from_hex(&hex_seed).unwrap();
        assert_eq!(kp.public, keypair_from_seed(&[7u8; 32]).public);
        assert!(keypair_from_hex("0707").is_err());
        assert!(keypair_from_hex("not hex").is_err());
    }
}

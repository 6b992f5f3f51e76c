//! Masternode ping: a signed liveness beacon.

use mx_types::{Hash256, KeyPair, Outpoint, PublicKey, Signature, Timestamp};
use serde::{Deserialize, Serialize};

/// Proves the operator of `outpoint` was online and following the chain at `sig_time`.
///
/// `block_hash` anchors the ping to a recent block (taken 12 blocks behind
/// the tip when signing) so old pings cannot be replayed indefinitely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub outpoint: Outpoint,
    pub block_hash: Hash256,
    pub sig_time: Timestamp,
    pub signature: Signature,
}

impl Ping {
    pub fn new(outpoint: Outpoint, block_hash: Hash256, sig_time: Timestamp) -> Self {
        Self {
            outpoint,
            block_hash,
            sig_time,
            signature: Signature::EMPTY,
        }
    }

    /// Build and sign a ping with the operational key.
    pub fn signed(
        outpoint: Outpoint,
        block_hash: Hash256,
        sig_time: Timestamp,
        operational: &KeyPair,
    ) -> Self {
        let mut ping = Self::new(outpoint, block_hash, sig_time);
        ping.sign(operational);
        ping
    }

    /// A ping that was never set (entries created from a bare announce carry one).
    pub fn is_empty(&self) -> bool {
        self.sig_time == Timestamp::EPOCH && self.signature.is_empty()
    }

    /// Dedup key for the seen-ping cache.
    pub fn hash(&self) -> Hash256 {
        mx_crypto::hash_parts(&[&self.outpoint.to_bytes(), &self.sig_time.as_secs().to_le_bytes()])
    }

    pub fn sign_message(&self) -> String {
        format!("{}{}{}", self.outpoint, self.block_hash, self.sig_time.as_secs())
    }

    pub fn sign(&mut self, operational: &KeyPair) {
        self.signature = mx_crypto::sign_message(self.sign_message().as_bytes(), &operational.private);
    }

    pub fn verify(&self, operational_key: &PublicKey) -> bool {
        mx_crypto::verify_signature(self.sign_message().as_bytes(), &self.signature, operational_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_crypto::keypair_from_seed;

    fn outpoint() -> Outpoint {
        Outpoint::new(Hash256::new([7u8; 32]), 1)
    }

    #[test]
    fn signed_ping_verifies_with_operational_key() {
        let key = keypair_from_seed(&[1u8; 32]);
        let ping = Ping::signed(outpoint(), Hash256::new([9u8; 32]), Timestamp::new(1_000), &key);
        assert!(ping.verify(&key.public));
        assert!(!ping.verify(&keypair_from_seed(&[2u8; 32]).public));
    }

    #[test]
    fn tampered_anchor_breaks_signature() {
        let key = keypair_from_seed(&[1u8; 32]);
        let mut ping = Ping::signed(outpoint(), Hash256::new([9u8; 32]), Timestamp::new(1_000), &key);
        ping.block_hash = Hash256::new([8u8; 32]);
        assert!(!ping.verify(&key.public));
    }

    #[test]
    fn hash_ignores_anchor_and_signature() {
        let key = keypair_from_seed(&[1u8; 32]);
        let a = Ping::signed(outpoint(), Hash256::new([9u8; 32]), Timestamp::new(1_000), &key);
        let b = Ping::new(outpoint(), Hash256::new([3u8; 32]), Timestamp::new(1_000));
        assert_eq!(a.hash(), b.hash());
        let c = Ping::new(outpoint(), Hash256::new([3u8; 32]), Timestamp::new(1_001));
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn default_ping_is_empty() {
        assert!(Ping::default().is_empty());
        let key = keypair_from_seed(&[1u8; 32]);
        assert!(!Ping::signed(outpoint(), Hash256::ZERO, Timestamp::new(5), &key).is_empty());
    }

    #[test]
    fn sign_message_layout() {
        let ping = Ping::new(outpoint(), Hash256::new([0xab; 32]), Timestamp::new(42));
        let expected = format!("{}-1{}42", "07".repeat(32), "ab".repeat(32));
        assert_eq!(ping.sign_message(), expected);
    }
}

//! Payment winner vote.

use mx_types::{Hash256, KeyPair, Outpoint, PublicKey, Script, Signature};
use serde::{Deserialize, Serialize};

/// "The masternode `voter` says `payee` should be paid at `height`."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVote {
    pub voter: Outpoint,
    pub height: u64,
    pub payee: Script,
    pub signature: Signature,
}

impl PaymentVote {
    pub fn new(voter: Outpoint, height: u64, payee: Script) -> Self {
        Self {
            voter,
            height,
            payee,
            signature: Signature::EMPTY,
        }
    }

    pub fn hash(&self) -> Hash256 {
        mx_crypto::hash_parts(&[
            self.payee.as_bytes(),
            &self.height.to_le_bytes(),
            &self.voter.to_bytes(),
        ])
    }

    pub fn sign_message(&self) -> String {
        format!("{}{}{}", self.voter, self.height, self.payee)
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
    use mx_crypto::{keypair_from_seed, payee_script};

    #[test]
    fn sign_and_verify() {
        let key = keypair_from_seed(&[4u8; 32]);
        let payee = payee_script(&keypair_from_seed(&[5u8; 32]).public);
        let mut vote = PaymentVote::new(Outpoint::new(Hash256::new([1u8; 32]), 0), 500, payee);
        vote.sign(&key);
        assert!(vote.verify(&key.public));

        let mut moved = vote.clone();
        moved.height = 501;
        assert!(!moved.verify(&key.public));
    }

    #[test]
    fn hash_covers_payee() {
        let voter = Outpoint::new(Hash256::new([1u8; 32]), 0);
        let a = PaymentVote::new(voter, 500, payee_script(&keypair_from_seed(&[5u8; 32]).public));
        let b = PaymentVote::new(voter, 500, payee_script(&keypair_from_seed(&[6u8; 32]).public));
        assert_ne!(a.hash(), b.hash());
    }
}

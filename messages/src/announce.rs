//! Masternode announce (broadcast): registration of a collateral outpoint.
//!
//! The announce is signed by the collateral key and carries the operational
//! key that signs every later ping and payment vote. Two canonical
//! encodings of the signed message exist; verification tries them in order
//! (see [`AnnounceEncoding`]).

use mx_types::params::LEGACY_ANNOUNCE_CUTOFF;
use mx_types::{Hash256, KeyPair, NetAddress, Outpoint, PublicKey, Signature, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{Ping, Rejection};

/// Canonical encodings of the announce signing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnounceEncoding {
    /// `addr || sig_time || hex(key_id(collateral)) || hex(key_id(operational)) || protocol`
    KeyId,
    /// `addr || sig_time || collateral bytes || operational bytes || protocol`,
    /// accepted only from protocol versions below the legacy cutoff.
    LegacyRawKey,
}

impl AnnounceEncoding {
    /// Encodings to try for an announce of `protocol_version`, newest first.
    pub fn strategies(protocol_version: u32) -> &'static [AnnounceEncoding] {
        if protocol_version < LEGACY_ANNOUNCE_CUTOFF {
            &[Self::KeyId, Self::LegacyRawKey]
        } else {
            &[Self::KeyId]
        }
    }

    pub fn message(&self, announce: &Announce) -> Vec<u8> {
        let mut msg = format!("{}{}", announce.addr, announce.sig_time.as_secs()).into_bytes();
        match self {
            Self::KeyId => {
                msg.extend_from_slice(hex::encode(mx_crypto::key_id(&announce.collateral_key)).as_bytes());
                msg.extend_from_slice(hex::encode(mx_crypto::key_id(&announce.operational_key)).as_bytes());
            }
            Self::LegacyRawKey => {
                msg.extend_from_slice(announce.collateral_key.as_bytes());
                msg.extend_from_slice(announce.operational_key.as_bytes());
            }
        }
        msg.extend_from_slice(announce.protocol_version.to_string().as_bytes());
        msg
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announce {
    pub outpoint: Outpoint,
    pub addr: NetAddress,
    /// Key that owns the collateral output; signs the announce.
    pub collateral_key: PublicKey,
    /// Hot key on the masternode itself; signs pings and votes.
    pub operational_key: PublicKey,
    pub signature: Signature,
    pub sig_time: Timestamp,
    pub protocol_version: u32,
    pub last_ping: Ping,
}

impl Announce {
    /// Build an announce with an embedded ping, signed by both keys.
    pub fn signed(
        outpoint: Outpoint,
        addr: NetAddress,
        collateral: &KeyPair,
        operational: &KeyPair,
        protocol_version: u32,
        ping_anchor: Hash256,
        now: Timestamp,
    ) -> Self {
        let mut announce = Self {
            outpoint,
            addr,
            collateral_key: collateral.public,
            operational_key: operational.public,
            signature: Signature::EMPTY,
            sig_time: now,
            protocol_version,
            last_ping: Ping::signed(outpoint, ping_anchor, now, operational),
        };
        announce.sign(collateral);
        announce
    }

    /// Seen-cache key. Independent of the signature and embedded ping.
    pub fn hash(&self) -> Hash256 {
        mx_crypto::hash_parts(&[&self.sig_time.as_secs().to_le_bytes(), self.collateral_key.as_bytes()])
    }

    /// Sign with the collateral key using the current encoding.
    pub fn sign(&mut self, collateral: &KeyPair) {
        let msg = AnnounceEncoding::KeyId.message(self);
        self.signature = mx_crypto::sign_message(&msg, &collateral.private);
    }

    /// Try each allowed encoding; returns the one that verified.
    ///
    /// Announces from current protocol versions that fail are scored 100;
    /// legacy versions are dropped without penalty.
    pub fn verify_signature(&self) -> Result<AnnounceEncoding, Rejection> {
        AnnounceEncoding::strategies(self.protocol_version)
            .iter()
            .copied()
            .find(|encoding| {
                mx_crypto::verify_signature(&encoding.message(self), &self.signature, &self.collateral_key)
            })
            .ok_or_else(|| {
                let dos = if self.protocol_version < LEGACY_ANNOUNCE_CUTOFF { 0 } else { 100 };
                Rejection::new(format!("bad announce signature for {}", self.outpoint), dos)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_crypto::keypair_from_seed;
    use mx_types::params::PROTOCOL_VERSION;

    fn build(protocol_version: u32) -> (Announce, KeyPair) {
        let collateral = keypair_from_seed(&[1u8; 32]);
        let operational = keypair_from_seed(&[2u8; 32]);
        let announce = Announce::signed(
            Outpoint::new(Hash256::new([5u8; 32]), 0),
            "203.0.113.7:9667".parse().unwrap(),
            &collateral,
            &operational,
            protocol_version,
            Hash256::new([6u8; 32]),
            Timestamp::new(1_700_000_000),
        );
        (announce, collateral)
    }

    #[test]
    fn current_encoding_verifies() {
        let (announce, _) = build(PROTOCOL_VERSION);
        assert_eq!(announce.verify_signature(), Ok(AnnounceEncoding::KeyId));
        assert!(announce.last_ping.verify(&announce.operational_key));
    }

    #[test]
    fn legacy_encoding_only_below_cutoff() {
        let (mut announce, collateral) = build(LEGACY_ANNOUNCE_CUTOFF - 1);
        let msg = AnnounceEncoding::LegacyRawKey.message(&announce);
        announce.signature = mx_crypto::sign_message(&msg, &collateral.private);
        assert_eq!(announce.verify_signature(), Ok(AnnounceEncoding::LegacyRawKey));

        let (mut announce, collateral) = build(LEGACY_ANNOUNCE_CUTOFF);
        let msg = AnnounceEncoding::LegacyRawKey.message(&announce);
        announce.signature = mx_crypto::sign_message(&msg, &collateral.private);
        let rejection = announce.verify_signature().unwrap_err();
        assert_eq!(rejection.dos, 100);
    }

    #[test]
    fn bad_legacy_signature_is_not_penalized() {
        let (mut announce, _) = build(LEGACY_ANNOUNCE_CUTOFF - 1);
        announce.signature = Signature::EMPTY;
        assert_eq!(announce.verify_signature().unwrap_err().dos, 0);
    }

    #[test]
    fn changed_address_breaks_signature() {
        let (mut announce, _) = build(PROTOCOL_VERSION);
        announce.addr = "203.0.113.8:9667".parse().unwrap();
        assert!(announce.verify_signature().is_err());
    }

    #[test]
    fn encodings_differ() {
        let (announce, _) = build(PROTOCOL_VERSION);
        assert_ne!(
            AnnounceEncoding::KeyId.message(&announce),
            AnnounceEncoding::LegacyRawKey.message(&announce)
        );
    }

    #[test]
    fn hash_tracks_sig_time_and_collateral_key() {
        let (a, _) = build(PROTOCOL_VERSION);
        let mut b = a.clone();
        b.addr = "198.51.100.1:9667".parse().unwrap();
        assert_eq!(a.hash(), b.hash());
        b.sig_time = b.sig_time.plus(1);
        assert_ne!(a.hash(), b.hash());
    }
}

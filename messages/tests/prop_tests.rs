use proptest::prelude::*;

use mx_crypto::keypair_from_seed;
use mx_messages::{Announce, MxMessage, PaymentVote};
use mx_types::params::PROTOCOL_VERSION;
use mx_types::{Hash256, NetAddress, Outpoint, Script, Timestamp};

proptest! {
    /// A signed announce verifies, and moving its timestamp invalidates it.
    #[test]
    fn announce_signature_binds_sig_time(
        seed in any::<[u8; 32]>(),
        txid in any::<[u8; 32]>(),
        sig_time in 1u64..4_000_000_000,
        shift in 1u64..10_000,
    ) {
        let collateral = keypair_from_seed(&seed);
        let operational = keypair_from_seed(&txid);
        let addr: NetAddress = "203.0.113.9:9667".parse().unwrap();
        let mut announce = Announce::signed(
            Outpoint::new(Hash256::new(txid), 0),
            addr,
            &collateral,
            &operational,
            PROTOCOL_VERSION,
            Hash256::ZERO,
            Timestamp::new(sig_time),
        );
        prop_assert!(announce.verify_signature().is_ok());
        announce.sig_time = announce.sig_time.plus(shift);
        prop_assert!(announce.verify_signature().is_err());
    }

    #[test]
    fn vote_survives_the_envelope(
        txid in any::<[u8; 32]>(),
        height in any::<u64>(),
        script in prop::collection::vec(any::<u8>(), 0..40),
    ) {
        let mut vote = PaymentVote::new(Outpoint::new(Hash256::new(txid), 3), height, Script::new(script));
        vote.sign(&keypair_from_seed(&txid));
        let msg = MxMessage::PaymentVote(vote.clone());
        let decoded = MxMessage::decode(&msg.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, MxMessage::PaymentVote(vote));
    }
}

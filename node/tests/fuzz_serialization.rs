//! Property-based fuzz tests for the message boundary.
//!
//! Anything a peer can put on the wire must either fail to decode or be
//! handled without panicking, and forged votes must never reach the tally.

use std::sync::Arc;

use proptest::prelude::*;

use mx_messages::{MxMessage, PaymentVote, PeerTransport, Ping, SyncAsset};
use mx_node::{Collaborators, MasternodeNode, NodeConfig};
use mx_nullables::{NullChain, NullClock, NullPeers, NullSporks};
use mx_types::params::PROTOCOL_VERSION;
use mx_types::{Hash256, NetworkId, Outpoint, Script, Signature, Timestamp};

const NOW: u64 = 1_700_000_000;

fn node() -> (Arc<NullPeers>, MasternodeNode) {
    let chain = Arc::new(NullChain::with_blocks(200, NOW - 200 * 60, 60));
    let peers = Arc::new(NullPeers::new());
    let collab = Collaborators {
        chain,
        sporks: Arc::new(NullSporks::new()),
        clock: Arc::new(NullClock::new(NOW)),
        peers: peers.clone(),
    };
    let config = NodeConfig {
        network: NetworkId::Test,
        data_dir: std::env::temp_dir(),
        ..NodeConfig::default()
    };
    let node = MasternodeNode::new(config, collab).expect("node");
    (peers, node)
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_hash() -> impl Strategy<Value = Hash256> {
    any::<[u8; 32]>().prop_map(Hash256::new)
}

fn arb_outpoint() -> impl Strategy<Value = Outpoint> {
    (arb_hash(), 0u32..4).prop_map(|(txid, index)| Outpoint::new(txid, index))
}

fn arb_signature() -> impl Strategy<Value = Signature> {
    (any::<[u8; 32]>(), any::<[u8; 32]>()).prop_map(|(r, s)| {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&r);
        bytes[32..].copy_from_slice(&s);
        Signature(bytes)
    })
}

fn arb_vote() -> impl Strategy<Value = PaymentVote> {
    (arb_outpoint(), 150u64..230, any::<[u8; 20]>(), arb_signature()).prop_map(
        |(voter, height, key_id, signature)| PaymentVote {
            signature,
            ..PaymentVote::new(voter, height, Script::pay_to_key_id(&key_id))
        },
    )
}

fn arb_message() -> impl Strategy<Value = MxMessage> {
    prop_oneof![
        arb_vote().prop_map(MxMessage::PaymentVote),
        (arb_outpoint(), arb_hash(), (NOW - 7200)..(NOW + 7200), arb_signature()).prop_map(
            |(outpoint, anchor, secs, signature)| MxMessage::Ping(Ping {
                signature,
                ..Ping::new(outpoint, anchor, Timestamp::new(secs))
            })
        ),
        arb_outpoint().prop_map(MxMessage::RequestList),
        any::<u32>().prop_map(MxMessage::RequestPaymentSync),
        any::<u32>().prop_map(|count| MxMessage::StatusCount {
            asset: SyncAsset::Winners,
            count
        }),
        Just(MxMessage::GetSporks),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_bytes_never_panic_the_dispatcher(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let (peers, node) = node();
        let id = peers.connect("198.51.100.1:19667", PROTOCOL_VERSION);
        let peer = peers.peer(id).unwrap();
        if let Ok(message) = MxMessage::decode(&bytes) {
            let _ = node.handle_message(&peer, message);
        }
    }

    #[test]
    fn arbitrary_messages_are_handled(message in arb_message()) {
        let (peers, node) = node();
        let id = peers.connect("198.51.100.1:19667", PROTOCOL_VERSION);
        let peer = peers.peer(id).unwrap();
        let encoded = message.encode().unwrap();
        let decoded = MxMessage::decode(&encoded).unwrap();
        prop_assert_eq!(&decoded, &message);
        let _ = node.handle_message(&peer, decoded);
        prop_assert!(node.registry.is_empty());
    }

    #[test]
    fn forged_votes_never_reach_the_tally(vote in arb_vote()) {
        let (peers, node) = node();
        let id = peers.connect("198.51.100.1:19667", PROTOCOL_VERSION);
        let peer = peers.peer(id).unwrap();
        prop_assert!(node.handle_message(&peer, MxMessage::PaymentVote(vote.clone())).is_err());
        prop_assert!(node.payments.is_empty());
        prop_assert_eq!(node.payments.block_payee(vote.height), None);
    }
}

use proptest::prelude::*;

use mx_consensus::BlockPayees;
use mx_types::params::SIGNATURES_REQUIRED;
use mx_types::{CoinbaseTx, Script, TxOut};

fn script(byte: u8) -> Script {
    Script::pay_to_key_id(&[byte; 20])
}

proptest! {
    /// The elected payee always holds the highest tally.
    #[test]
    fn payee_has_the_most_votes(votes in prop::collection::vec((0u8..6, 1u32..4), 1..40)) {
        let mut block = BlockPayees::new(1_000);
        for (payee, weight) in &votes {
            block.add_payee(script(*payee), *weight);
        }
        let elected = block.payee().unwrap().clone();
        let best = block.payees.iter().map(|p| p.votes).max().unwrap();
        prop_assert!(block.has_payee_with_votes(&elected, best));
        let total: u32 = votes.iter().map(|(_, w)| *w).sum();
        prop_assert_eq!(block.payees.iter().map(|p| p.votes).sum::<u32>(), total);
    }

    /// Nothing is enforced until some payee reaches the quorum.
    #[test]
    fn below_quorum_every_coinbase_is_valid(
        votes in prop::collection::vec(0u8..4, 0..(SIGNATURES_REQUIRED as usize)),
        paid in any::<u8>(),
        value in 0u64..1_000_000,
    ) {
        let mut block = BlockPayees::new(1_000);
        for payee in &votes {
            block.add_payee(script(*payee), 1);
        }
        let tx = CoinbaseTx::new(vec![TxOut::new(value, script(paid))]);
        prop_assert!(block.is_transaction_valid(&tx, value / 3));
    }
}

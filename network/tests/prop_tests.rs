use std::sync::Arc;

use proptest::prelude::*;

use mx_masternode::SyncProgress;
use mx_network::{SyncStage, SyncStatus, SYNC_THRESHOLD};
use mx_nullables::{NullChain, NullClock};
use mx_types::Hash256;

proptest! {
    /// However often an item is seen, it counts as new at most twice.
    #[test]
    fn sightings_never_exceed_the_threshold(items in prop::collection::vec(0u8..8, 0..64)) {
        let chain = Arc::new(NullChain::with_blocks(5, 1_000, 60));
        let status = SyncStatus::new(chain, Arc::new(NullClock::new(1_300)));
        for item in &items {
            status.added_winner(Hash256::new([*item; 32]));
        }
        let seen = status.snapshot().seen_winners;
        prop_assert!(seen.values().all(|n| *n >= 1 && *n <= SYNC_THRESHOLD));
        let distinct: std::collections::HashSet<_> = items.iter().collect();
        prop_assert_eq!(seen.len(), distinct.len());
    }

    /// Every stage code maps back to its stage; nothing else parses.
    #[test]
    fn stage_codes_are_exact(code in 0u32..1_100) {
        match SyncStage::try_from(code) {
            Ok(stage) => prop_assert_eq!(stage.code(), code),
            Err(_) => prop_assert!(![0, 1, 2, 3, 4, 998, 999].contains(&code)),
        }
    }
}

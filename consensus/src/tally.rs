//! Per-height payee tallies.

use mx_types::params::SIGNATURES_REQUIRED;
use mx_types::{CoinbaseTx, Script};
use serde::{Deserialize, Serialize};

/// One candidate payout script and the weight of votes behind it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeVotes {
    pub script: Script,
    pub votes: u32,
}

/// Every payee voted for at one block height, in first-vote order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayees {
    pub height: u64,
    pub payees: Vec<PayeeVotes>,
}

impl BlockPayees {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            payees: Vec::new(),
        }
    }

    pub fn add_payee(&mut self, script: Script, weight: u32) {
        match self.payees.iter_mut().find(|p| p.script == script) {
            Some(existing) => existing.votes = existing.votes.saturating_add(weight),
            None => self.payees.push(PayeeVotes { script, votes: weight }),
        }
    }

    /// The most-voted payee. The earliest one wins a tie.
    pub fn payee(&self) -> Option<&Script> {
        let mut best: Option<&PayeeVotes> = None;
        for candidate in &self.payees {
            if best.map_or(true, |b| candidate.votes > b.votes) {
                best = Some(candidate);
            }
        }
        best.map(|p| &p.script)
    }

    pub fn has_payee_with_votes(&self, script: &Script, votes: u32) -> bool {
        self.payees
            .iter()
            .any(|p| p.votes >= votes && &p.script == script)
    }

    /// Payees that reached the quorum.
    pub fn enforced(&self) -> impl Iterator<Item = &PayeeVotes> {
        self.payees.iter().filter(|p| p.votes >= SIGNATURES_REQUIRED)
    }

    /// Whether `tx` pays `payment` to a payee that reached the quorum.
    ///
    /// Below quorum nothing is enforced and every coinbase passes.
    pub fn is_transaction_valid(&self, tx: &CoinbaseTx, payment: u64) -> bool {
        if self.enforced().next().is_none() {
            return true;
        }
        if self.enforced().any(|p| tx.pays(&p.script, payment)) {
            return true;
        }
        tracing::warn!(
            height = self.height,
            payment,
            required = %self.enforced().map(|p| p.script.to_string()).collect::<Vec<_>>().join(", "),
            "coinbase is missing a required masternode payment"
        );
        false
    }

    /// `"script:votes, script:votes"` in first-vote order.
    pub fn required_payments_string(&self) -> String {
        self.payees
            .iter()
            .map(|p| format!("{}:{}", p.script, p.votes))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

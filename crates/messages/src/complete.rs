//! Completion marker for a multi-partition transaction.

use serde::{Deserialize, Serialize};
use strata_types::{CompletionKind, CompletionSequence, TxnId};

/// Ends (commit or rollback), repairs, or restarts an MP transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransactionMessage {
    /// Transaction being completed.
    pub txn_id: TxnId,
    /// Sequence stamp; [`CompletionSequence::INITIAL`] for ordinary completions.
    pub sequence: CompletionSequence,
    /// Roll back instead of commit.
    pub rollback: bool,
}

impl CompleteTransactionMessage {
    /// Ordinary completion from the original coordinator.
    pub fn new(txn_id: TxnId, rollback: bool) -> Self {
        Self {
            txn_id,
            sequence: CompletionSequence::INITIAL,
            rollback,
        }
    }

    /// Completion stamped with a repair or restart sequence.
    pub fn with_sequence(txn_id: TxnId, sequence: CompletionSequence, rollback: bool) -> Self {
        Self {
            txn_id,
            sequence,
            rollback,
        }
    }

    /// Kind of completion.
    pub fn kind(&self) -> CompletionKind {
        self.sequence.kind()
    }

    /// True for restart completions.
    pub fn is_restart(&self) -> bool {
        self.sequence.is_restart()
    }
}

//! Error types for the transaction task queue.

use crate::TaskKind;
use strata_types::{SiteIndex, TxnId};
use thiserror::Error;

/// Invariant violations detected by the queue.
///
/// Stale or duplicate completions are not errors; they are reported as
/// [`Disposition::Discarded`](crate::Disposition::Discarded).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A task was bound to a transaction state of the wrong scope.
    #[error("{kind:?} task for {txn_id} bound to the wrong state scope (single_partition = {single_partition})")]
    KindMismatch {
        txn_id: TxnId,
        kind: TaskKind,
        single_partition: bool,
    },

    /// The task's message names a different transaction than its state.
    #[error("Task for {task} bound to the state of {state}")]
    TxnMismatch { task: TxnId, state: TxnId },

    /// A completion was handled as missing but its transaction is queued here.
    #[error("Completion for {0} handled as missing but the transaction is in the backlog")]
    TxnInBacklog(TxnId),

    /// Only completion tasks may take the missing-transaction path.
    #[error("{kind:?} task for {txn_id} is not a completion")]
    NotACompletion { txn_id: TxnId, kind: TaskKind },

    /// Scoreboard slot requested beyond the configured site count.
    #[error("Scoreboard site {index} out of range for {site_count} sites")]
    SiteIndexOutOfRange { index: SiteIndex, site_count: usize },
}

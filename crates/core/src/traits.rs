//! Capability traits for external collaborators.

use crate::{BatchPlan, ExecutionError, OutboundMessage, SendError};
use strata_messages::PlanFragment;
use strata_types::{DependencyResults, SiteId, Table, TxnId};

/// Delivers messages to site mailboxes.
///
/// Implementations must be thread safe: a coordinator and the sites it
/// drives may send from different threads.
///
/// # Example
///
/// ```ignore
/// let msg = OutboundMessage::FragmentTask(batch);
/// if remotes.len() == 1 {
///     sender.send(remotes[0], msg)?;
/// } else {
///     sender.send_many(&remotes, msg)?;
/// }
/// ```
pub trait Sender: Send + Sync {
    /// Send a message to one site.
    fn send(&self, dest: SiteId, message: OutboundMessage) -> Result<(), SendError>;

    /// Send one message to several sites.
    ///
    /// Either every destination is accepted or the call fails; callers rely
    /// on fan-out being all-or-nothing per batch.
    fn send_many(&self, dests: &[SiteId], message: OutboundMessage) -> Result<(), SendError>;
}

/// Runs plan fragments against the storage engine.
pub trait FragmentExecutor {
    /// Execute one fragment for `txn_id` and return its output table.
    ///
    /// `inputs` holds every table collected for the fragment's input
    /// dependency, one per respondent; it is empty when the fragment has
    /// no input dependency.
    fn execute_fragment(
        &mut self,
        txn_id: TxnId,
        fragment: &PlanFragment,
        inputs: &[Table],
        read_only: bool,
    ) -> Result<Table, ExecutionError>;
}

/// Execution surface handed to a coordinator while it drives a procedure.
///
/// Besides running fragments, the context owns the procedure body: after
/// each batch resolves it is shown the results and may return another
/// batch to run within the same invocation.
pub trait ExecutionContext: FragmentExecutor {
    /// Produce the next batch, or `None` when the procedure is finished.
    fn next_batch(&mut self, txn_id: TxnId, results: &DependencyResults) -> Option<BatchPlan>;
}

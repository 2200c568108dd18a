//! Transaction tasks: units of work bound to a transaction state.

use crate::{QueueError, SiteTaskQueue, TransactionTaskQueue};
use std::sync::{Arc, Weak};
use strata_core::{FragmentExecutor, TransactionState};
use strata_messages::{
    CompleteTransactionMessage, FragmentResponseMessage, FragmentTaskMessage, InitiateTaskMessage,
};
use strata_types::{SpHandle, TxnId};
use tracing::{debug, warn};

/// Discriminant of [`TaskWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Fragment,
    Complete,
    SpProcedure,
}

/// The message a task was created from.
#[derive(Debug, Clone)]
pub enum TaskWork {
    /// A batch of fragments of an MP transaction.
    Fragment(FragmentTaskMessage),
    /// Commit, rollback, repair or restart of an MP transaction.
    Complete(CompleteTransactionMessage),
    /// A single-partition procedure invocation.
    SpProcedure(InitiateTaskMessage),
}

/// Result of running a task on the site thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Fragment batch executed; the response goes back to the coordinator.
    Response(FragmentResponseMessage),
    /// Transaction finished at this site.
    Completed {
        /// False if the state had already been marked done.
        first: bool,
        /// Tasks released from the backlog by the resulting flush.
        released: usize,
    },
    /// Restart completion: the state stays open for the next incarnation.
    Restarted,
    /// Single-partition procedure finished.
    ProcedureRun,
}

/// A unit of work bound to one transaction state at one site.
///
/// Keeps a weak back-reference to the site queue that runs it, so the
/// scoreboard can deliver a released task to the right site.
#[derive(Debug)]
pub struct TransactionTask {
    state: Arc<TransactionState>,
    work: TaskWork,
    site_queue: Weak<SiteTaskQueue>,
}

impl TransactionTask {
    /// Fragment task for the site served by `queue`.
    pub fn fragment(
        queue: &TransactionTaskQueue,
        state: Arc<TransactionState>,
        msg: FragmentTaskMessage,
    ) -> Self {
        debug_assert_eq!(state.txn_id(), msg.txn_id);
        Self::bind(queue, state, TaskWork::Fragment(msg))
    }

    /// Completion task for the site served by `queue`.
    pub fn completion(
        queue: &TransactionTaskQueue,
        state: Arc<TransactionState>,
        msg: CompleteTransactionMessage,
    ) -> Self {
        debug_assert_eq!(state.txn_id(), msg.txn_id);
        Self::bind(queue, state, TaskWork::Complete(msg))
    }

    /// SP procedure task for the site served by `queue`.
    pub fn sp_procedure(
        queue: &TransactionTaskQueue,
        state: Arc<TransactionState>,
        msg: InitiateTaskMessage,
    ) -> Self {
        debug_assert_eq!(state.sp_handle(), msg.sp_handle);
        Self::bind(queue, state, TaskWork::SpProcedure(msg))
    }

    fn bind(queue: &TransactionTaskQueue, state: Arc<TransactionState>, work: TaskWork) -> Self {
        Self {
            state,
            work,
            site_queue: Arc::downgrade(queue.site_queue()),
        }
    }

    pub fn state(&self) -> &Arc<TransactionState> {
        &self.state
    }

    pub fn work(&self) -> &TaskWork {
        &self.work
    }

    pub fn site_queue(&self) -> &Weak<SiteTaskQueue> {
        &self.site_queue
    }

    pub fn txn_id(&self) -> TxnId {
        self.state.txn_id()
    }

    pub fn sp_handle(&self) -> SpHandle {
        self.state.sp_handle()
    }

    pub fn kind(&self) -> TaskKind {
        match self.work {
            TaskWork::Fragment(_) => TaskKind::Fragment,
            TaskWork::Complete(_) => TaskKind::Complete,
            TaskWork::SpProcedure(_) => TaskKind::SpProcedure,
        }
    }

    /// True for fragment and completion tasks.
    pub fn is_multi_partition(&self) -> bool {
        !matches!(self.work, TaskWork::SpProcedure(_))
    }

    pub fn fragment_message(&self) -> Option<&FragmentTaskMessage> {
        match &self.work {
            TaskWork::Fragment(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn completion_message(&self) -> Option<&CompleteTransactionMessage> {
        match &self.work {
            TaskWork::Complete(msg) => Some(msg),
            _ => None,
        }
    }

    /// Two tasks belong to the same incarnation of a transaction.
    pub fn same_incarnation(&self, other: &TransactionTask) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Check the task is consistent with its state.
    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        let single_partition = self.state.is_single_partition();
        if single_partition == self.is_multi_partition() {
            return Err(QueueError::KindMismatch {
                txn_id: self.txn_id(),
                kind: self.kind(),
                single_partition,
            });
        }
        let message_txn = match &self.work {
            TaskWork::Fragment(msg) => msg.txn_id,
            TaskWork::Complete(msg) => msg.txn_id,
            TaskWork::SpProcedure(msg) => msg.sp_handle.as_txn_id(),
        };
        if message_txn != self.txn_id() {
            return Err(QueueError::TxnMismatch {
                task: message_txn,
                state: self.txn_id(),
            });
        }
        Ok(())
    }

    /// Run the task on the site thread.
    ///
    /// Fragment batches execute every fragment in plan order; the first
    /// failure turns the whole response into a failure. Ordinary and repair
    /// completions mark the state done and flush `queue`.
    pub fn run(
        &self,
        queue: &TransactionTaskQueue,
        executor: &mut dyn FragmentExecutor,
    ) -> TaskOutcome {
        match &self.work {
            TaskWork::Fragment(msg) => {
                let site = queue.site_queue().site_id();
                let mut response = FragmentResponseMessage::new(msg.txn_id, site);
                for fragment in &msg.fragments {
                    match executor.execute_fragment(msg.txn_id, fragment, &[], msg.read_only) {
                        Ok(table) => response.add_dependency(fragment.output_dep, table),
                        Err(e) => {
                            warn!(txn_id = %msg.txn_id, error = %e, "Fragment execution failed");
                            return TaskOutcome::Response(FragmentResponseMessage::failure(
                                msg.txn_id,
                                site,
                                e.to_string(),
                            ));
                        }
                    }
                }
                TaskOutcome::Response(response)
            }
            TaskWork::Complete(msg) if msg.is_restart() => {
                debug!(txn_id = %msg.txn_id, sequence = %msg.sequence, "Restart completion run");
                TaskOutcome::Restarted
            }
            TaskWork::Complete(msg) => {
                let first = self.state.set_done();
                if !first {
                    debug!(txn_id = %msg.txn_id, "Transaction already done");
                }
                let released = queue.flush(msg.txn_id);
                TaskOutcome::Completed { first, released }
            }
            TaskWork::SpProcedure(_) => {
                self.state.set_done();
                TaskOutcome::ProcedureRun
            }
        }
    }
}

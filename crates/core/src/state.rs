//! Per-transaction state shared by the tasks of one transaction at a site.

use std::sync::atomic::{AtomicBool, Ordering};
use strata_messages::FragmentTaskMessage;
use strata_types::{SpHandle, TxnId};
use tracing::trace;

/// Identity and done flag of one transaction at one site.
///
/// Every task of a transaction holds the same `Arc<TransactionState>`. A
/// restarted MP transaction gets a fresh state with the same `txn_id`;
/// queues tell incarnations apart by pointer identity.
#[derive(Debug)]
pub struct TransactionState {
    txn_id: TxnId,
    sp_handle: SpHandle,
    single_partition: bool,
    read_only: bool,
    done: AtomicBool,
}

impl TransactionState {
    /// State for a site participating in an MP transaction, created when
    /// the first fragment of that transaction arrives.
    pub fn participant(sp_handle: SpHandle, first_fragment: &FragmentTaskMessage) -> Self {
        Self::multi_partition(first_fragment.txn_id, sp_handle, first_fragment.read_only)
    }

    /// State for an MP transaction.
    pub fn multi_partition(txn_id: TxnId, sp_handle: SpHandle, read_only: bool) -> Self {
        Self {
            txn_id,
            sp_handle,
            single_partition: false,
            read_only,
            done: AtomicBool::new(false),
        }
    }

    /// State for an SP transaction. Its transaction id is its local handle.
    pub fn single_partition(sp_handle: SpHandle, read_only: bool) -> Self {
        Self {
            txn_id: sp_handle.as_txn_id(),
            sp_handle,
            single_partition: true,
            read_only,
            done: AtomicBool::new(false),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn sp_handle(&self) -> SpHandle {
        self.sp_handle
    }

    pub fn is_single_partition(&self) -> bool {
        self.single_partition
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether a completion has marked this transaction done.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Mark the transaction done.
    ///
    /// Returns true only for the call that performed the transition.
    pub fn set_done(&self) -> bool {
        let transitioned = !self.done.swap(true, Ordering::AcqRel);
        trace!(txn_id = %self.txn_id, transitioned, "Transaction marked done");
        transitioned
    }
}

//! Fragment batch request.

use serde::{Deserialize, Serialize};
use strata_types::{BatchId, DependencyId, FragmentId, SiteId, TxnId};

/// One planned fragment within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFragment {
    /// Planned fragment to execute.
    pub fragment_id: FragmentId,
    /// Dependency id the fragment's output table is delivered under.
    pub output_dep: DependencyId,
    /// Dependency whose collected tables feed this fragment, if any.
    pub input_dep: Option<DependencyId>,
    /// Opaque parameter blob.
    pub params: Vec<u8>,
}

impl PlanFragment {
    /// Create a fragment with no input dependency.
    pub fn new(fragment_id: FragmentId, output_dep: DependencyId, params: Vec<u8>) -> Self {
        Self {
            fragment_id,
            output_dep,
            input_dep: None,
            params,
        }
    }

    /// Attach an input dependency.
    pub fn with_input_dep(mut self, dep: DependencyId) -> Self {
        self.input_dep = Some(dep);
        self
    }
}

/// Request to execute a batch of fragments for one MP transaction.
///
/// Sent by the coordinator to every participating site, or executed only
/// locally when the batch qualifies for the single-fragment optimization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentTaskMessage {
    /// Multi-partition transaction this batch belongs to.
    pub txn_id: TxnId,
    /// Site that coordinates the transaction and collects responses.
    pub coordinator: SiteId,
    /// Batch within the transaction.
    pub batch_id: BatchId,
    /// The batch performs no writes.
    pub read_only: bool,
    /// Every table the batch references is fully replicated.
    pub replicated_only: bool,
    /// Fragments to execute, in plan order.
    pub fragments: Vec<PlanFragment>,
    /// This is the last batch the procedure issues.
    pub is_final: bool,
}

impl FragmentTaskMessage {
    /// Create an empty batch.
    pub fn new(txn_id: TxnId, coordinator: SiteId, batch_id: BatchId, read_only: bool) -> Self {
        Self {
            txn_id,
            coordinator,
            batch_id,
            read_only,
            replicated_only: false,
            fragments: Vec::new(),
            is_final: false,
        }
    }

    /// Mark every referenced table as replicated.
    pub fn with_replicated_only(mut self, replicated_only: bool) -> Self {
        self.replicated_only = replicated_only;
        self
    }

    /// Mark this batch as the procedure's last.
    pub fn with_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    /// Append a fragment, builder style.
    pub fn with_fragment(mut self, fragment: PlanFragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Append a fragment.
    pub fn add_fragment(&mut self, fragment: PlanFragment) {
        self.fragments.push(fragment);
    }

    /// Set the input dependency of the fragment at `index`.
    ///
    /// Returns false if there is no fragment at that index.
    pub fn add_input_dep(&mut self, index: usize, dep: DependencyId) -> bool {
        match self.fragments.get_mut(index) {
            Some(fragment) => {
                fragment.input_dep = Some(dep);
                true
            }
            None => false,
        }
    }

    /// Output dependency ids in plan order.
    pub fn output_dep_ids(&self) -> impl Iterator<Item = DependencyId> + '_ {
        self.fragments.iter().map(|f| f.output_dep)
    }

    /// Input dependency ids in plan order.
    pub fn input_dep_ids(&self) -> impl Iterator<Item = DependencyId> + '_ {
        self.fragments.iter().filter_map(|f| f.input_dep)
    }

    /// Number of fragments in the batch.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// True if the batch carries no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Whether only the coordinator needs to run this batch.
    pub fn is_single_fragment_eligible(&self) -> bool {
        self.read_only && self.replicated_only
    }
}

//! Fragment response.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_types::{DependencyId, SiteId, Table, TxnId};

/// Outcome reported by the executing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// Every fragment executed.
    Success,
    /// Execution failed at the responding site.
    Failure(String),
}

/// One site's results for a fragment batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentResponseMessage {
    /// Transaction the batch belongs to.
    pub txn_id: TxnId,
    /// Site that executed the batch.
    pub executor: SiteId,
    /// Execution outcome.
    pub status: ResponseStatus,
    /// Output table per dependency id.
    pub dependencies: IndexMap<DependencyId, Table>,
}

impl FragmentResponseMessage {
    /// Create a successful response with no tables yet.
    pub fn new(txn_id: TxnId, executor: SiteId) -> Self {
        Self {
            txn_id,
            executor,
            status: ResponseStatus::Success,
            dependencies: IndexMap::new(),
        }
    }

    /// Create a failed response.
    pub fn failure(txn_id: TxnId, executor: SiteId, reason: impl Into<String>) -> Self {
        Self {
            txn_id,
            executor,
            status: ResponseStatus::Failure(reason.into()),
            dependencies: IndexMap::new(),
        }
    }

    /// Attach a table, builder style.
    pub fn with_dependency(mut self, dep: DependencyId, table: Table) -> Self {
        self.add_dependency(dep, table);
        self
    }

    /// Attach a table. A second table for the same id replaces the first.
    pub fn add_dependency(&mut self, dep: DependencyId, table: Table) {
        self.dependencies.insert(dep, table);
    }

    /// True if the batch executed.
    pub fn is_success(&self) -> bool {
        matches!(self.status, ResponseStatus::Success)
    }
}

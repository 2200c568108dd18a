//! Scripted fragment executor.

use std::collections::{HashMap, VecDeque};
use strata_core::{BatchPlan, ExecutionContext, ExecutionError, FragmentExecutor};
use strata_messages::PlanFragment;
use strata_types::{DependencyId, DependencyResults, FragmentId, Table, TxnId};

/// One recorded `execute_fragment` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedFragment {
    pub txn_id: TxnId,
    pub fragment_id: FragmentId,
    pub output_dep: DependencyId,
    pub input_dep: Option<DependencyId>,
    /// Number of input tables handed to the call.
    pub inputs: usize,
    pub read_only: bool,
}

/// Executor returning scripted tables.
///
/// Unscripted fragments produce a one-column `BOGO` table holding the
/// fragment id. As an [`ExecutionContext`] it hands out queued follow-on
/// batches in order and records the results it was shown.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    tables: HashMap<FragmentId, Table>,
    failures: HashMap<FragmentId, String>,
    batches: VecDeque<BatchPlan>,
    executed: Vec<ExecutedFragment>,
    seen_results: Vec<DependencyResults>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `table` whenever `fragment` runs.
    pub fn with_table(mut self, fragment: FragmentId, table: Table) -> Self {
        self.tables.insert(fragment, table);
        self
    }

    /// Fail whenever `fragment` runs.
    pub fn with_failure(mut self, fragment: FragmentId, reason: impl Into<String>) -> Self {
        self.failures.insert(fragment, reason.into());
        self
    }

    /// Queue a follow-on batch for `next_batch`.
    pub fn with_batch(mut self, batch: BatchPlan) -> Self {
        self.batches.push_back(batch);
        self
    }

    pub fn executed(&self) -> &[ExecutedFragment] {
        &self.executed
    }

    /// Calls whose fragment consumed `dep`.
    pub fn executed_with_input(&self, dep: DependencyId) -> usize {
        self.executed
            .iter()
            .filter(|e| e.input_dep == Some(dep))
            .count()
    }

    /// Calls whose fragment had no input dependency.
    pub fn executed_without_input(&self) -> usize {
        self.executed.iter().filter(|e| e.input_dep.is_none()).count()
    }

    /// Results passed to `next_batch`, in call order.
    pub fn seen_results(&self) -> &[DependencyResults] {
        &self.seen_results
    }
}

impl FragmentExecutor for ScriptedExecutor {
    fn execute_fragment(
        &mut self,
        txn_id: TxnId,
        fragment: &PlanFragment,
        inputs: &[Table],
        read_only: bool,
    ) -> Result<Table, ExecutionError> {
        self.executed.push(ExecutedFragment {
            txn_id,
            fragment_id: fragment.fragment_id,
            output_dep: fragment.output_dep,
            input_dep: fragment.input_dep,
            inputs: inputs.len(),
            read_only,
        });
        if let Some(reason) = self.failures.get(&fragment.fragment_id) {
            return Err(ExecutionError::Fragment {
                fragment: fragment.fragment_id,
                reason: reason.clone(),
            });
        }
        Ok(self.tables.get(&fragment.fragment_id).cloned().unwrap_or_else(|| {
            Table::new(["BOGO"]).with_row(vec![fragment.fragment_id.0 as i64])
        }))
    }
}

impl ExecutionContext for ScriptedExecutor {
    fn next_batch(&mut self, _txn_id: TxnId, results: &DependencyResults) -> Option<BatchPlan> {
        self.seen_results.push(results.clone());
        self.batches.pop_front()
    }
}

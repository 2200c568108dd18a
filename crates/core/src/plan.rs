//! Follow-on batch issued by a running procedure.

use strata_messages::FragmentTaskMessage;
use strata_types::DependencyId;

/// One fragment batch a procedure issues after seeing earlier results.
///
/// `remote` is the work every participant runs; `local` is the work the
/// coordinator runs on the collected remote outputs. `deps_to_resume`
/// names the dependency ids whose tables are handed back to the procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub remote: Option<FragmentTaskMessage>,
    pub local: FragmentTaskMessage,
    pub deps_to_resume: Vec<DependencyId>,
    pub is_final: bool,
}

impl BatchPlan {
    /// Batch that runs only on the coordinator.
    pub fn local_only(local: FragmentTaskMessage, deps_to_resume: Vec<DependencyId>) -> Self {
        Self {
            remote: None,
            is_final: local.is_final,
            local,
            deps_to_resume,
        }
    }

    /// Batch with participant work feeding the local fragments.
    pub fn distributed(
        remote: FragmentTaskMessage,
        local: FragmentTaskMessage,
        deps_to_resume: Vec<DependencyId>,
    ) -> Self {
        Self {
            remote: Some(remote),
            is_final: local.is_final,
            local,
            deps_to_resume,
        }
    }
}

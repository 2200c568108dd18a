//! Error types for MP coordination.

use strata_core::{ExecutionError, SendError};
use strata_types::{DependencyId, SiteId, TxnId};
use thiserror::Error;

/// Errors while driving a multi-partition transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpError {
    /// Fragment work was created before `setup_procedure_resume`.
    #[error("No batch set up for {0}")]
    NoActiveBatch(TxnId),

    /// A new batch was set up while the previous one is unresolved.
    #[error("Batch already in progress for {0}")]
    BatchInProgress(TxnId),

    /// A message for another transaction reached this coordinator.
    #[error("Expected a message for {expected}, got {got}")]
    WrongTransaction { expected: TxnId, got: TxnId },

    /// A participant failed to execute its fragments.
    #[error("Fragment execution failed at {site}: {reason}")]
    RemoteFailure { site: SiteId, reason: String },

    /// The procedure resumes on a dependency no fragment produced.
    #[error("No result for resume dependency {0}")]
    MissingResumeDependency(DependencyId),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Local execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

//! Errors reported by external collaborators.

use strata_types::{DependencyId, FragmentId, SiteId};
use thiserror::Error;

/// Errors from executing a plan fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The engine failed to run the fragment.
    #[error("Fragment {fragment} failed: {reason}")]
    Fragment {
        fragment: FragmentId,
        reason: String,
    },

    /// An input dependency was absent or malformed.
    #[error("Invalid input dependency {0}")]
    InvalidInput(DependencyId),

    /// The procedure aborted itself.
    #[error("Procedure aborted: {0}")]
    Aborted(String),
}

/// Errors from the message transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// A destination mailbox is not known to the transport.
    #[error("Unknown destination {0}")]
    UnknownDestination(SiteId),

    /// The transport is shutting down.
    #[error("Transport closed")]
    Closed,
}

//! Core types for partitioned transaction ordering.
//!
//! This crate holds the vocabulary shared by every other crate in the
//! workspace: identifiers for transactions, sites and dependencies, the
//! opaque result [`Table`] produced by fragment execution, and the
//! completion sequence numbers used to tell a fresh repair/restart
//! completion from a stale resend.

mod identifiers;
mod sequence;
mod table;

pub use identifiers::{BatchId, DependencyId, FragmentId, SiteId, SiteIndex, SpHandle, TxnId};
pub use sequence::{CompletionKind, CompletionSequence, RestartSequenceGenerator};
pub use table::{DependencyResults, Table};

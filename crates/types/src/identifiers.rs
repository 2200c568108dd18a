//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier.
///
/// For multi-partition transactions this is the globally coordinated id
/// issued by the coordinator. For single-partition transactions it is the
/// partition-local handle (see [`SpHandle`]); the two spaces never mix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Get the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({})", self.0)
    }
}

/// Partition-local transaction handle.
///
/// Every task a site receives is stamped with a handle from that site's
/// own monotonically increasing space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SpHandle(pub u64);

impl SpHandle {
    /// Get the next handle.
    pub fn next(self) -> Self {
        SpHandle(self.0 + 1)
    }

    /// Interpret this handle as a single-partition transaction id.
    pub fn as_txn_id(self) -> TxnId {
        TxnId(self.0)
    }
}

impl fmt::Display for SpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpHandle({})", self.0)
    }
}

/// Host-site identifier: the mailbox address of one partition's site.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SiteId(pub u64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Site({})", self.0)
    }
}

/// Dense index of a site within one process.
///
/// Scoreboard slots are addressed by this index, not by [`SiteId`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SiteIndex(pub usize);

impl fmt::Display for SiteIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SiteIndex({})", self.0)
    }
}

/// Key identifying one fragment's expected output within a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DependencyId(pub i32);

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dep({})", self.0)
    }
}

/// Identifier of a planned fragment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FragmentId(pub u64);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fragment({})", self.0)
    }
}

/// Identifier of one fragment batch within a transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl BatchId {
    /// Get the next batch id.
    pub fn next(self) -> Self {
        BatchId(self.0 + 1)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch({})", self.0)
    }
}

//! Single-partition procedure invocation.

use serde::{Deserialize, Serialize};
use strata_types::SpHandle;

/// Runs a stored procedure entirely within one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateTaskMessage {
    /// Partition-local handle; doubles as the transaction id.
    pub sp_handle: SpHandle,
    /// Procedure name.
    pub procedure: String,
    /// Opaque parameter blob.
    pub params: Vec<u8>,
    /// The procedure performs no writes.
    pub read_only: bool,
}

impl InitiateTaskMessage {
    pub fn new(sp_handle: SpHandle, procedure: impl Into<String>, read_only: bool) -> Self {
        Self {
            sp_handle,
            procedure: procedure.into(),
            params: Vec::new(),
            read_only,
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Vec<u8>) -> Self {
        self.params = params;
        self
    }
}

//! Configuration for MP coordination.

use serde::Deserialize;

/// Configuration for a multi-partition coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MpConfig {
    /// Run read-only batches over replicated tables locally only.
    pub single_fragment_optimization: bool,

    /// Batches within one run above which each further batch logs a warning.
    pub batch_depth_warn: usize,
}

impl Default for MpConfig {
    fn default() -> Self {
        Self {
            single_fragment_optimization: true,
            batch_depth_warn: 64,
        }
    }
}

impl MpConfig {
    /// Enable or disable the single-fragment optimization.
    pub fn with_single_fragment_optimization(mut self, enabled: bool) -> Self {
        self.single_fragment_optimization = enabled;
        self
    }

    /// Set the batch depth warning threshold.
    pub fn with_batch_depth_warn(mut self, depth: usize) -> Self {
        self.batch_depth_warn = depth;
        self
    }
}

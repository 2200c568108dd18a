//! Configuration for the transaction task queue.

use serde::Deserialize;

/// Configuration for one site's transaction task queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    /// Whether MP write work is coordinated through the shared scoreboard.
    ///
    /// When disabled, completions are neither checked for staleness nor
    /// held for other sites; every admitted task dispatches directly.
    pub scoreboard_enabled: bool,

    /// Backlog length above which each newly parked task logs a warning.
    pub backlog_warn_threshold: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            scoreboard_enabled: true,
            backlog_warn_threshold: 10_000,
        }
    }
}

impl TaskQueueConfig {
    /// Enable or disable scoreboard coordination.
    pub fn with_scoreboard_enabled(mut self, enabled: bool) -> Self {
        self.scoreboard_enabled = enabled;
        self
    }

    /// Set the backlog warning threshold.
    pub fn with_backlog_warn_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warn_threshold = threshold;
        self
    }
}

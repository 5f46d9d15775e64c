//! Progress reporting for farm-wide operations

use tracing::info;

/// Write-only, line-oriented progress output
pub trait ProgressSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Forwards progress lines to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn write_line(&self, line: &str) {
        info!(progress = %line, "FARM_PROGRESS");
    }
}

/// Outcome of a farm-wide restart, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RestartSummary {
    pub attempted: Vec<String>,
    pub failed: Vec<String>,
}

impl RestartSummary {
    pub fn succeeded(&self) -> usize {
        self.attempted.len() - self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

//! Structured run logging.
//!
//! Every log line of a merge run carries the run ID and the operation, so a
//! single run can be followed through concurrent traffic.

use std::time::Duration;

use mixmux_models::{RunId, StageName};
use tracing::{error, info, warn, Span};

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    operation: String,
}

impl RunLogger {
    /// Create a new logger for a run and operation (e.g. "merge", "delivery").
    pub fn new(run_id: &RunId, operation: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    /// Log a stage entering `Running`.
    pub fn log_stage_start(&self, stage: StageName) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            stage = stage.as_str(),
            "Stage started"
        );
    }

    /// Log a stage that succeeded, with its wall time.
    pub fn log_stage_complete(&self, stage: StageName, elapsed: Duration) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            stage = stage.as_str(),
            duration_ms = elapsed.as_millis() as u64,
            "Stage completed"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "merge_run",
            run_id = %self.run_id,
            operation = %self.operation
        )
    }
}

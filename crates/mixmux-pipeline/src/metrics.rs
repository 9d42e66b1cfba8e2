//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

use metrics::{counter, histogram};
use mixmux_models::StageName;

use crate::error::ErrorKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "mixmux_runs_total";
    pub const STAGE_FAILURES_TOTAL: &str = "mixmux_stage_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "mixmux_stage_duration_seconds";
    pub const FETCH_BYTES_TOTAL: &str = "mixmux_fetch_bytes_total";
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Delivered,
    Failed,
    /// The caller went away before the artifact was fully streamed
    Abandoned,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Delivered => "delivered",
            RunOutcome::Failed => "failed",
            RunOutcome::Abandoned => "abandoned",
        }
    }
}

pub fn record_run(outcome: RunOutcome) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: StageName, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_stage_failure(stage: Option<StageName>, kind: ErrorKind) {
    let labels = [
        ("stage", stage.map_or("none", |s| s.as_str()).to_string()),
        ("kind", kind.as_str().to_string()),
    ];
    counter!(names::STAGE_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_fetch_bytes(bytes: u64) {
    counter!(names::FETCH_BYTES_TOTAL).increment(bytes);
}

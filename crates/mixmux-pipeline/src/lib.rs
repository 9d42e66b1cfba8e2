//! Merge pipeline orchestration.
//!
//! This crate turns a [`mixmux_models::MergeRequest`] into one delivered file:
//! - [`MergePipeline`] opens a run, fetches remote inputs and drives the
//!   concatenate, mix and mux stages in order
//! - [`PipelineError`] and [`StageFailure`] classify failures for callers
//! - [`ResultDelivery`] streams the artifact and releases the run's scratch
//!   arena once the hand-off is over

pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;

pub use config::PipelineConfig;
pub use delivery::ResultDelivery;
pub use error::{ErrorKind, PipelineError, PipelineResult, StageFailure};
pub use logging::RunLogger;
pub use orchestrator::{stage_plan, CompletedMerge, FailedMerge, MergePipeline, OpenRun};

//! Shared data models for the mixmux merge service.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets (uploads and remote references) and their lifecycle
//! - Merge requests and their validation
//! - Pipeline runs, stages and run states
//! - Delivery encoding defaults

pub mod asset;
pub mod encoding;
pub mod request;
pub mod run;

// Re-export common types
pub use asset::{AssetKind, AssetState, MediaAsset, MediaClass};
pub use encoding::DeliveryEncoding;
pub use request::{MergeRequest, MergeMode, RequestError};
pub use run::{
    PipelineRun, RunId, RunState, StageName, StageRecord, StageStatus, TransitionError,
};

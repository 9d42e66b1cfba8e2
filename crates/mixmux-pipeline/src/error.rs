//! Pipeline error taxonomy and the user-facing failure shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mixmux_media::MediaError;
use mixmux_models::{RequestError, StageName, TransitionError};

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Why a run failed. The payload is the full diagnostic, for logs only.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Resource error: {0}")]
    Resource(String),
}

/// Short machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "fetch_error")]
    Fetch,
    #[serde(rename = "process_error")]
    Process,
    #[serde(rename = "resource_error")]
    Resource,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Fetch => "fetch_error",
            ErrorKind::Process => "process_error",
            ErrorKind::Resource => "resource_error",
        }
    }

    /// Fixed phrase shown to callers in place of the raw diagnostic.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "The merge request is invalid",
            ErrorKind::Fetch => "A remote input could not be downloaded",
            ErrorKind::Process => "Media processing failed",
            ErrorKind::Resource => "Scratch storage is unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Fetch(_) => ErrorKind::Fetch,
            PipelineError::Process(_) => ErrorKind::Process,
            PipelineError::Resource(_) => ErrorKind::Resource,
        }
    }
}

impl From<MediaError> for PipelineError {
    fn from(err: MediaError) -> Self {
        let detail = match err.stderr() {
            Some(stderr) if !stderr.is_empty() => format!("{err}\n{stderr}"),
            _ => err.to_string(),
        };

        if err.is_fetch_failure() {
            PipelineError::Fetch(detail)
        } else if err.is_resource_failure() {
            PipelineError::Resource(detail)
        } else if matches!(err, MediaError::NoInputs(_)) {
            PipelineError::Validation(detail)
        } else {
            PipelineError::Process(detail)
        }
    }
}

impl From<RequestError> for PipelineError {
    fn from(err: RequestError) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

impl From<TransitionError> for PipelineError {
    fn from(err: TransitionError) -> Self {
        PipelineError::Resource(format!("illegal run transition: {err}"))
    }
}

/// Structured failure handed to the adapter layer.
///
/// `message` never contains subprocess output or server paths. Validation
/// failures carry their own message since it only describes the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Option<StageName>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Option<StageName>, error: &PipelineError) -> Self {
        let kind = error.kind();
        let message = match error {
            PipelineError::Validation(msg) => msg.clone(),
            _ => kind.public_message().to_string(),
        };
        Self {
            stage,
            kind,
            message,
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} in {}: {}", self.kind, stage.as_str(), self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

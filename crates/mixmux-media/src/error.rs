//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Download of {url} failed: {message}")]
    DownloadFailed {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No {0} inputs supplied")]
    NoInputs(&'static str),

    #[error("Scratch directory {path} unavailable: {source}")]
    ArenaUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scratch arena already released")]
    ArenaReleased,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(
        url: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
            status,
        }
    }

    /// Remote retrieval failed (network, status, empty body, bad URL).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, MediaError::DownloadFailed { .. } | MediaError::InvalidUrl(_))
    }

    /// Scratch filesystem failure rather than a transcoding failure.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            MediaError::ArenaUnavailable { .. } | MediaError::ArenaReleased | MediaError::Io(_)
        )
    }

    /// Captured stderr of the external process, if any. Diagnostic only.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use mixmux_models::encoding::{DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC};
use mixmux_models::DeliveryEncoding;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base directory under which every run gets its own scratch directory
    pub work_dir: PathBuf,
    /// Upper bound for a single FFmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Upper bound for a single remote fetch
    pub fetch_timeout: Duration,
    /// Remote inputs fetched at the same time within one run
    pub max_parallel_fetches: usize,
    /// Audio settings of the delivered file
    pub encoding: DeliveryEncoding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("mixmux"),
            ffmpeg_timeout: Duration::from_secs(600),
            fetch_timeout: Duration::from_secs(120),
            max_parallel_fetches: 4,
            encoding: DeliveryEncoding::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("MIXMUX_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("mixmux")),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("MIXMUX_FFMPEG_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            fetch_timeout: Duration::from_secs(
                std::env::var("MIXMUX_FETCH_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_parallel_fetches: std::env::var("MIXMUX_MAX_PARALLEL_FETCHES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(4),
            encoding: DeliveryEncoding {
                audio_codec: std::env::var("MIXMUX_AUDIO_CODEC")
                    .unwrap_or_else(|_| DEFAULT_AUDIO_CODEC.to_string()),
                audio_bitrate: std::env::var("MIXMUX_AUDIO_BITRATE")
                    .unwrap_or_else(|_| DEFAULT_AUDIO_BITRATE.to_string()),
                faststart: true,
            },
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

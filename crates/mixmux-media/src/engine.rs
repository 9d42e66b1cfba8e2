//! Transform seam between the orchestrator and the transcoding engine.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use mixmux_models::DeliveryEncoding;

use crate::arena::ScratchArena;
use crate::command::FfmpegRunner;
use crate::concat::concatenate_videos;
use crate::error::MediaResult;
use crate::mix::mix_audio;
use crate::mux::mux_streams;
use crate::probe::get_duration;

/// The three media transforms a merge needs.
///
/// Each call returns the path of one new artifact in `arena`. A transform may
/// also allocate helper scratch files there (the concat manifest, for one);
/// those are removed with the arena.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Join videos end to end, preserving order.
    async fn concatenate(&self, inputs: &[PathBuf], arena: &ScratchArena) -> MediaResult<PathBuf>;

    /// Sum audio tracks; the result lasts as long as the longest input.
    async fn mix(&self, inputs: &[PathBuf], arena: &ScratchArena) -> MediaResult<PathBuf>;

    /// Combine one video and one audio stream, truncated to the shorter.
    async fn mux(&self, video: &Path, audio: &Path, arena: &ScratchArena) -> MediaResult<PathBuf>;

    /// Container duration in seconds.
    async fn duration(&self, path: &Path) -> MediaResult<f64>;
}

/// [`MediaEngine`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    runner: FfmpegRunner,
    encoding: DeliveryEncoding,
}

impl FfmpegEngine {
    pub fn new(encoding: DeliveryEncoding) -> Self {
        Self {
            runner: FfmpegRunner::new(),
            encoding,
        }
    }

    /// Kill any single FFmpeg invocation running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn concatenate(&self, inputs: &[PathBuf], arena: &ScratchArena) -> MediaResult<PathBuf> {
        concatenate_videos(inputs, arena, &self.runner).await
    }

    async fn mix(&self, inputs: &[PathBuf], arena: &ScratchArena) -> MediaResult<PathBuf> {
        mix_audio(inputs, arena, &self.runner).await
    }

    async fn mux(&self, video: &Path, audio: &Path, arena: &ScratchArena) -> MediaResult<PathBuf> {
        mux_streams(video, audio, arena, &self.runner, &self.encoding).await
    }

    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        get_duration(path).await
    }
}

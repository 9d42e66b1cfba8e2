//! Final mux of one video stream and one audio stream.

use std::path::{Path, PathBuf};
use tracing::info;

use mixmux_models::encoding::DELIVERY_CONTAINER;
use mixmux_models::DeliveryEncoding;

use crate::arena::ScratchArena;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Combine `video` and `audio` into the deliverable.
///
/// The video stream is copied, the audio is encoded per `encoding`, and the
/// output ends with the shorter of the two streams.
pub async fn mux_streams(
    video: &Path,
    audio: &Path,
    arena: &ScratchArena,
    runner: &FfmpegRunner,
    encoding: &DeliveryEncoding,
) -> MediaResult<PathBuf> {
    for input in [video, audio] {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
    }

    let output = arena.allocate(&format!("merged.{DELIVERY_CONTAINER}"))?;
    let cmd = mux_command(video, audio, &output, encoding);

    info!(output = %output.display(), "Muxing video and audio");
    runner.run(&cmd).await?;

    Ok(output)
}

fn mux_command(video: &Path, audio: &Path, output: &Path, encoding: &DeliveryEncoding) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(video)
        .input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .video_codec("copy")
        .output_args(encoding.to_ffmpeg_args())
        .shortest()
}

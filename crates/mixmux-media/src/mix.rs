//! Additive audio mixing.
//!
//! N inputs are summed with FFmpeg's `amix` filter. The mix lasts as long as
//! the longest input; shorter inputs drop out to silence after their end.
//! The mixing curve is the engine default.

use std::path::PathBuf;
use tracing::{debug, info};

use mixmux_models::encoding::{MIX_AUDIO_CODEC, MIX_CONTAINER};

use crate::arena::ScratchArena;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Seconds over which `amix` renormalizes volume when an input ends.
const DROPOUT_TRANSITION_SECS: u32 = 2;

/// Mix `inputs` down to one track in a new arena file.
///
/// A single input is copied without invoking FFmpeg.
pub async fn mix_audio(
    inputs: &[PathBuf],
    arena: &ScratchArena,
    runner: &FfmpegRunner,
) -> MediaResult<PathBuf> {
    let (first, rest) = inputs.split_first().ok_or(MediaError::NoInputs("audio"))?;
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }

    if rest.is_empty() {
        debug!(input = %first.display(), "Single audio input, copying");
        return arena.import_copy(first, "mix").await;
    }

    let output = arena.allocate(&format!("mix.{MIX_CONTAINER}"))?;
    let cmd = mix_command(inputs, &output);

    info!(inputs = inputs.len(), output = %output.display(), "Mixing audio");
    runner.run(&cmd).await?;

    Ok(output)
}

/// `amix` graph over the first audio stream of each of `count` inputs.
pub fn build_amix_filter(count: usize) -> String {
    let labels: String = (0..count).map(|i| format!("[{i}:a:0]")).collect();
    format!(
        "{labels}amix=inputs={count}:duration=longest:dropout_transition={DROPOUT_TRANSITION_SECS}[aout]"
    )
}

fn mix_command(inputs: &[PathBuf], output: &std::path::Path) -> FfmpegCommand {
    inputs
        .iter()
        .fold(FfmpegCommand::new(output), |cmd, input| cmd.input(input))
        .filter_complex(build_amix_filter(inputs.len()))
        .map("[aout]")
        .no_video()
        .audio_codec(MIX_AUDIO_CODEC)
}

//! Order-preserving video concatenation.
//!
//! Uses FFmpeg's concat demuxer driven by a manifest file, with stream copy.
//! Inputs must share codec parameters; when they do not, FFmpeg fails and the
//! failure surfaces as an error rather than a corrupt output.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::arena::ScratchArena;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Concatenate `inputs` back to back into one new arena file.
///
/// A single input is copied without invoking FFmpeg. Inputs are never
/// modified or removed.
pub async fn concatenate_videos(
    inputs: &[PathBuf],
    arena: &ScratchArena,
    runner: &FfmpegRunner,
) -> MediaResult<PathBuf> {
    let (first, rest) = inputs.split_first().ok_or(MediaError::NoInputs("video"))?;
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }

    if rest.is_empty() {
        debug!(input = %first.display(), "Single video input, copying");
        return arena.import_copy(first, "concat").await;
    }

    let mut absolute = Vec::with_capacity(inputs.len());
    for input in inputs {
        absolute.push(tokio::fs::canonicalize(input).await?);
    }

    let manifest = arena.allocate("concat-list.txt")?;
    tokio::fs::write(&manifest, build_concat_manifest(&absolute)).await?;

    let output = arena.allocate(&format!("concat.{}", container_extension(first)))?;
    let cmd = concat_command(&manifest, &output);

    info!(inputs = inputs.len(), output = %output.display(), "Concatenating videos");
    runner.run(&cmd).await?;

    Ok(output)
}

/// Concat demuxer manifest listing `paths` in order.
pub fn build_concat_manifest(paths: &[PathBuf]) -> String {
    let mut manifest = String::from("ffconcat version 1.0\n");
    for path in paths {
        manifest.push_str("file '");
        manifest.push_str(&escape_manifest_path(path));
        manifest.push_str("'\n");
    }
    manifest
}

fn concat_command(manifest: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input_args(["-f", "concat", "-safe", "0"])
        .input(manifest)
        .map("0")
        .stream_copy()
}

/// Single quotes end a quoted manifest token, so each becomes `'\''`.
fn escape_manifest_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// Output keeps the first input's container so stream copy stays valid.
fn container_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "mp4".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_preserves_order_and_escapes() {
        let manifest = build_concat_manifest(&[
            PathBuf::from("/tmp/run/001-b.mp4"),
            PathBuf::from("/tmp/run/000-it's.mp4"),
        ]);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines[0], "ffconcat version 1.0");
        assert_eq!(lines[1], "file '/tmp/run/001-b.mp4'");
        assert_eq!(lines[2], r"file '/tmp/run/000-it'\''s.mp4'");
    }

    #[test]
    fn test_concat_command_is_stream_copy() {
        let args = concat_command(Path::new("/tmp/list.txt"), Path::new("/tmp/out.mp4")).build_args();
        assert!(args.windows(2).any(|w| w == ["-f", "concat"]));
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(!args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn test_container_extension() {
        assert_eq!(container_extension(Path::new("a.MOV")), "mov");
        assert_eq!(container_extension(Path::new("a")), "mp4");
    }

    #[tokio::test]
    async fn test_single_input_is_copied_without_ffmpeg() {
        let base = TempDir::new().unwrap();
        let src = base.path().join("clip.mp4");
        tokio::fs::write(&src, b"not really a video").await.unwrap();

        let arena = ScratchArena::open(base.path(), "run").await.unwrap();
        // A runner is never consulted for a single input
        let out = concatenate_videos(&[src.clone()], &arena, &FfmpegRunner::new())
            .await
            .unwrap();

        assert_ne!(out, src);
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"not really a video");
        assert_eq!(tokio::fs::read(&src).await.unwrap(), b"not really a video");
    }

    #[tokio::test]
    async fn test_rejects_empty_and_missing_inputs() {
        let base = TempDir::new().unwrap();
        let arena = ScratchArena::open(base.path(), "run").await.unwrap();
        let runner = FfmpegRunner::new();

        assert!(matches!(
            concatenate_videos(&[], &arena, &runner).await,
            Err(MediaError::NoInputs("video"))
        ));

        let missing = base.path().join("missing.mp4");
        assert!(matches!(
            concatenate_videos(&[missing.clone(), missing], &arena, &runner).await,
            Err(MediaError::FileNotFound(_))
        ));
        assert!(arena.tracked().is_empty());
    }
}

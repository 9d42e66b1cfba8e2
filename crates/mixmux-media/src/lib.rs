#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for media merging.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building (never through a shell)
//! - Progress parsing from `-progress pipe:2`
//! - A per-run scratch arena that owns every intermediate file
//! - Remote asset fetching into the arena
//! - The three transforms: concatenate video, mix audio, mux

pub mod arena;
pub mod command;
pub mod concat;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod mix;
pub mod mux;
pub mod probe;
pub mod progress;

pub use arena::ScratchArena;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::concatenate_videos;
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{MediaError, MediaResult};
pub use fetch::{AssetFetcher, ResourceFetcher};
pub use mix::mix_audio;
pub use mux::mux_streams;
pub use probe::{probe_media, MediaInfo};
pub use progress::FfmpegProgress;

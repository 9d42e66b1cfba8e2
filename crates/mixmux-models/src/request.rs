//! Merge request model and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use crate::asset::{MediaAsset, MediaClass};

/// Reasons a request is rejected before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("At least one video input is required")]
    NoVideo,

    #[error("Invalid {class} URL '{url}': {reason}")]
    InvalidUrl {
        class: MediaClass,
        url: String,
        reason: String,
    },

    #[error("Asset '{location}' is not a {expected} input")]
    ClassMismatch {
        location: String,
        expected: MediaClass,
    },
}

/// Which stages a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Concatenate, mix, then mux
    Full,
    /// No audio supplied: the concatenated video is the deliverable
    VideoOnly,
}

/// Ordered video and audio inputs of one merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeRequest {
    pub videos: Vec<MediaAsset>,
    pub audios: Vec<MediaAsset>,
}

impl MergeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, asset: MediaAsset) -> Self {
        self.videos.push(asset);
        self
    }

    pub fn with_audio(mut self, asset: MediaAsset) -> Self {
        self.audios.push(asset);
        self
    }

    /// Check the request shape. Never touches the network or the filesystem.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.videos.is_empty() {
            return Err(RequestError::NoVideo);
        }

        for (assets, expected) in [
            (&self.videos, MediaClass::Video),
            (&self.audios, MediaClass::Audio),
        ] {
            for asset in assets {
                if asset.media_class != expected {
                    return Err(RequestError::ClassMismatch {
                        location: asset.original_location.clone(),
                        expected,
                    });
                }
                if asset.is_remote() {
                    validate_remote_url(expected, &asset.original_location)?;
                }
            }
        }

        Ok(())
    }

    pub fn mode(&self) -> MergeMode {
        if self.audios.is_empty() {
            MergeMode::VideoOnly
        } else {
            MergeMode::Full
        }
    }

    pub fn remote_count(&self) -> usize {
        self.assets().filter(|a| a.is_remote()).count()
    }

    /// All assets, videos first, in request order.
    pub fn assets(&self) -> impl Iterator<Item = &MediaAsset> {
        self.videos.iter().chain(self.audios.iter())
    }

    pub fn assets_mut(&mut self) -> impl Iterator<Item = &mut MediaAsset> {
        self.videos.iter_mut().chain(self.audios.iter_mut())
    }

    /// True once every asset has a local file.
    pub fn all_ready(&self) -> bool {
        self.assets().all(MediaAsset::is_ready)
    }

    /// Local paths of the video inputs in order, if all are ready.
    pub fn video_paths(&self) -> Option<Vec<PathBuf>> {
        ready_paths(&self.videos)
    }

    /// Local paths of the audio inputs in order, if all are ready.
    pub fn audio_paths(&self) -> Option<Vec<PathBuf>> {
        ready_paths(&self.audios)
    }
}

fn ready_paths(assets: &[MediaAsset]) -> Option<Vec<PathBuf>> {
    assets
        .iter()
        .map(|a| if a.is_ready() { a.local_path.clone() } else { None })
        .collect()
}

fn validate_remote_url(class: MediaClass, raw: &str) -> Result<(), RequestError> {
    let invalid = |reason: &str| RequestError::InvalidUrl {
        class,
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(invalid("only http and https are supported")),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

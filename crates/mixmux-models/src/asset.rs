//! Media asset model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How an asset entered the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// File staged locally from a multipart upload
    Upload,
    /// Remote URL that must be fetched before use
    RemoteReference,
}

/// Whether the asset carries the picture or the soundtrack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Video,
    Audio,
}

impl MediaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Video => "video",
            MediaClass::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// Known to the request, not yet materialized
    #[default]
    Registered,
    /// Remote fetch in flight
    Fetching,
    /// Local file available
    Ready,
    /// Handed to a transform stage
    Consumed,
    /// Materialization failed
    Failed,
}

impl AssetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Registered => "registered",
            AssetState::Fetching => "fetching",
            AssetState::Ready => "ready",
            AssetState::Consumed => "consumed",
            AssetState::Failed => "failed",
        }
    }
}

/// One input unit of a merge request.
///
/// Assets are owned by exactly one [`crate::MergeRequest`] and never shared
/// across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub kind: AssetKind,
    /// Filesystem path for uploads, URL for remote references
    pub original_location: String,
    /// Set once the asset is materialized
    pub local_path: Option<PathBuf>,
    pub media_class: MediaClass,
    pub state: AssetState,
}

impl MediaAsset {
    /// An uploaded file that has already been staged on disk.
    pub fn upload(media_class: MediaClass, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            kind: AssetKind::Upload,
            original_location: path.to_string_lossy().to_string(),
            local_path: Some(path),
            media_class,
            state: AssetState::Ready,
        }
    }

    /// A remote reference that still has to be fetched.
    pub fn remote(media_class: MediaClass, url: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::RemoteReference,
            original_location: url.into(),
            local_path: None,
            media_class,
            state: AssetState::Registered,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.kind == AssetKind::RemoteReference
    }

    pub fn is_ready(&self) -> bool {
        self.state == AssetState::Ready && self.local_path.is_some()
    }

    /// Registered -> Fetching.
    pub fn mark_fetching(&mut self) {
        debug_assert_eq!(self.state, AssetState::Registered);
        self.state = AssetState::Fetching;
    }

    /// Fetching -> Ready.
    pub fn mark_ready(&mut self, local_path: impl Into<PathBuf>) {
        self.local_path = Some(local_path.into());
        self.state = AssetState::Ready;
    }

    /// Ready -> Consumed.
    pub fn mark_consumed(&mut self) {
        if self.state == AssetState::Ready {
            self.state = AssetState::Consumed;
        }
    }

    /// Any non-terminal state -> Failed.
    pub fn mark_failed(&mut self) {
        if self.state != AssetState::Consumed {
            self.state = AssetState::Failed;
        }
    }
}

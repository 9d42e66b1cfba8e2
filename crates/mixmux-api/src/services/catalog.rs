//! Background music catalog backed by the Cloudinary admin API.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::CatalogConfig;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Catalog responded with HTTP {0}")]
    Status(u16),
}

/// One track offered to clients as a remote audio input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicTrack {
    pub id: String,
    pub title: String,
    pub duration: f64,
    /// Secure URL, usable as a remote audio reference in a merge
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ResourcesResponse {
    #[serde(default)]
    resources: Vec<CloudinaryResource>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryResource {
    public_id: String,
    secure_url: String,
    #[serde(default)]
    duration: Option<f64>,
}

impl From<CloudinaryResource> for MusicTrack {
    fn from(resource: CloudinaryResource) -> Self {
        let title = resource
            .public_id
            .rsplit('/')
            .next()
            .unwrap_or(&resource.public_id)
            .to_string();
        Self {
            title,
            id: resource.public_id,
            duration: resource.duration.unwrap_or(0.0),
            url: resource.secure_url,
        }
    }
}

/// Lists audio assets stored under a folder prefix.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Fetch the track list. Audio lives under Cloudinary's `video` resource type.
    pub async fn list_tracks(&self) -> Result<Vec<MusicTrack>, CatalogError> {
        let url = format!(
            "{}/v1_1/{}/resources/video/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .query(&[
                ("prefix", self.config.folder.clone()),
                ("max_results", self.config.max_results.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body: ResourcesResponse = response.json().await?;
        debug!(count = body.resources.len(), "Loaded music catalog");

        Ok(body.resources.into_iter().map(MusicTrack::from).collect())
    }
}

//! Merge handlers.
//!
//! Both endpoints build a [`MergeRequest`], run it through the pipeline and
//! stream the merged file back. The run's scratch arena is released by the
//! response body once it has been sent (or dropped).

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use mixmux_models::{MediaAsset, MediaClass, MergeRequest};
use mixmux_pipeline::{CompletedMerge, OpenRun, ResultDelivery};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// JSON body of `POST /api/merge/urls`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeUrlsRequest {
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_urls: Vec<String>,
    pub audio_url: Option<String>,
    #[serde(default)]
    pub audio_urls: Vec<String>,
}

impl MergeUrlsRequest {
    /// Single URL first, then the list, each in the order given.
    pub fn into_merge_request(self) -> MergeRequest {
        let videos = self.video_url.into_iter().chain(self.video_urls);
        let audios = self.audio_url.into_iter().chain(self.audio_urls);

        let request = videos
            .filter(|u| !u.trim().is_empty())
            .fold(MergeRequest::new(), |r, url| {
                r.with_video(MediaAsset::remote(MediaClass::Video, url.trim()))
            });
        audios
            .filter(|u| !u.trim().is_empty())
            .fold(request, |r, url| {
                r.with_audio(MediaAsset::remote(MediaClass::Audio, url.trim()))
            })
    }
}

/// Merge remote inputs given as URLs.
pub async fn merge_urls(
    State(state): State<AppState>,
    Json(body): Json<MergeUrlsRequest>,
) -> ApiResult<Response> {
    let request = body.into_merge_request();
    let run = state.pipeline.open_run().await?;
    info!(run_id = %run.run_id(), "Merge requested by URL");

    let completed = state.pipeline.execute(run, request).await?;
    deliver(completed).await
}

/// Merge uploaded files, optionally mixed with remote URLs.
///
/// File fields: `videos`/`video`, `audios`/`audio`. Text fields:
/// `videoUrl(s)`/`audioUrl(s)`, comma or newline separated. Order of
/// appearance is the merge order.
pub async fn merge_upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let run = state.pipeline.open_run().await?;
    info!(run_id = %run.run_id(), "Merge requested by upload");

    let request = match stage_multipart(&run, &mut multipart).await {
        Ok(request) => request,
        Err(e) => {
            run.discard().await;
            return Err(e);
        }
    };

    let completed = state.pipeline.execute(run, request).await?;
    deliver(completed).await
}

/// Write uploaded parts into the run's arena and collect the request.
async fn stage_multipart(run: &OpenRun, multipart: &mut Multipart) -> ApiResult<MergeRequest> {
    let mut request = MergeRequest::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "videos" | "video" | "audios" | "audio" => {
                let class = if name.starts_with("video") {
                    MediaClass::Video
                } else {
                    MediaClass::Audio
                };
                let file_name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{class}.bin"));

                let path = run
                    .arena()
                    .allocate(&format!("upload-{file_name}"))
                    .map_err(|e| ApiError::internal(e.to_string()))?;

                let mut file = tokio::fs::File::create(&path).await?;
                let mut written = 0usize;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {e}")))?
                {
                    file.write_all(&chunk).await?;
                    written += chunk.len();
                }
                file.flush().await?;

                if written == 0 {
                    return Err(ApiError::bad_request(format!("Uploaded file '{file_name}' is empty")));
                }
                debug!(field = %name, bytes = written, "Staged upload");

                let asset = MediaAsset::upload(class, path);
                request = match class {
                    MediaClass::Video => request.with_video(asset),
                    MediaClass::Audio => request.with_audio(asset),
                };
            }
            "videoUrl" | "videoUrls" | "audioUrl" | "audioUrls" => {
                let class = if name.starts_with("video") {
                    MediaClass::Video
                } else {
                    MediaClass::Audio
                };
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid field '{name}': {e}")))?;

                for url in text.split(|c: char| c == ',' || c == '\n').map(str::trim).filter(|u| !u.is_empty()) {
                    let asset = MediaAsset::remote(class, url);
                    request = match class {
                        MediaClass::Video => request.with_video(asset),
                        MediaClass::Audio => request.with_audio(asset),
                    };
                }
            }
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    Ok(request)
}

/// Stream the merged file. The body owns the run's arena.
async fn deliver(completed: CompletedMerge) -> ApiResult<Response> {
    let delivery = ResultDelivery::open(completed).await?;

    let content_type = delivery.content_type();
    let content_length = delivery.byte_len();
    let disposition = format!("attachment; filename=\"{}\"", delivery.file_name());
    let run_id = delivery.run_id().to_string();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header("X-Run-Id", run_id)
        .body(Body::from_stream(delivery))
        .map_err(|e| ApiError::internal(e.to_string()))
}

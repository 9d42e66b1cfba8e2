//! Background music catalog handler.

use axum::extract::State;
use axum::Json;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::services::MusicTrack;
use crate::state::AppState;

/// List the tracks available as background music.
pub async fn list_background_music(State(state): State<AppState>) -> ApiResult<Json<Vec<MusicTrack>>> {
    let catalog = state
        .catalog
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Music catalog is not configured".to_string()))?;

    let tracks = catalog.list_tracks().await.map_err(|e| {
        error!(error = %e, "Music catalog lookup failed");
        ApiError::Catalog
    })?;

    Ok(Json(tracks))
}

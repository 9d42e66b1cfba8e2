//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use mixmux_pipeline::{ErrorKind, FailedMerge};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Failed to load music")]
    Catalog,

    #[error("{0}")]
    Merge(Box<FailedMerge>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Catalog | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Merge(failed) => status_for_kind(failed.failure.kind),
        }
    }
}

/// HTTP status for a failed merge run.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Fetch => StatusCode::BAD_GATEWAY,
        ErrorKind::Process => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Resource => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<FailedMerge> for ApiError {
    fn from(failed: FailedMerge) -> Self {
        Self::Merge(Box::new(failed))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            ApiError::Merge(failed) => ErrorResponse {
                detail: failed.failure.message.clone(),
                stage: failed.failure.stage.map(|s| s.as_str()),
                kind: Some(failed.failure.kind.as_str()),
                run_id: Some(failed.run_id().to_string()),
            },
            _ => ErrorResponse {
                detail: self.to_string(),
                stage: None,
                kind: None,
                run_id: None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::Internal(_) | ApiError::Io(_)) {
            response.extensions_mut().insert(InternalErrorDetail);
        }
        response
    }
}

/// Marks a response whose body carries internal diagnostics.
///
/// [`crate::middleware::redact_internal_errors`] replaces such bodies in
/// production.
#[derive(Debug, Clone, Copy)]
pub struct InternalErrorDetail;

/// Body sent in place of an internal error's diagnostics.
pub(crate) fn redacted_internal_error(status: StatusCode) -> Response {
    let body = ErrorResponse {
        detail: "An internal error occurred".to_string(),
        stage: None,
        kind: None,
        run_id: None,
    };
    (status, Json(body)).into_response()
}

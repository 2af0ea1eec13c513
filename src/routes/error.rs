use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::job::JobId;

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Upload contained no image files")]
    NoImages,

    #[error("Unsupported image format: {0}")]
    UnsupportedImage(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] garde::Report),

    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("No preview available for job {0}")]
    PreviewNotFound(JobId),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Multipart(e) => e.status(),
            ApiError::NoImages | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::JobNotFound(_) | ApiError::PreviewNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

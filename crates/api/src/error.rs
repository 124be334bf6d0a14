//! API error types and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use camera_capture::CameraError;
use dms::DmsError;
use serde_json::json;
use thiserror::Error;
use video_stream::StreamError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No frame available yet")]
    NoFrame,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFrame => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidSettings(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Task(e.to_string())
    }
}

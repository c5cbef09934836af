//! API error type and its HTTP mapping

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inference_engine::InferenceError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing multipart field `file`")]
    MissingFile,

    #[error("Invalid multipart request: {0}")]
    BadRequest(#[from] MultipartRejection),

    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// JSON body of error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::BadRequest(rejection) => rejection.status(),
            ApiError::Upload(err) => err.status(),
            ApiError::Inference(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingFile | ApiError::BadRequest(_) | ApiError::Upload(_) => "request",
            ApiError::Inference(err) if err.is_client_error() => "decode",
            ApiError::Inference(_) => "inference",
            ApiError::Task(_) => "task",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }
        metrics::counter!("plantcare_prediction_errors_total", "kind" => self.kind()).increment(1);

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

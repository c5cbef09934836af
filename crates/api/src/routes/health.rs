//! Health Route

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Inference runtime in use
    pub backend: String,
    /// Size of the label table
    pub classes: usize,
    /// Side length images are resized to before inference
    pub image_size: u32,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        backend: state.classifier.backend_name().to_string(),
        classes: state.classifier.labels().len(),
        image_size: state.classifier.preprocessor().image_size(),
    })
}

//! Label Routes

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::AppState;

/// Class names in model output order
pub async fn get_labels(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.classifier.labels().as_slice().to_vec())
}

//! Prediction Route

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use inference_engine::Prediction;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::{ApiError, AppState};

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Classify an uploaded leaf photograph
///
/// Expects a multipart form with the image in the `file` field; other
/// fields are skipped.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            debug!(
                "Received upload {:?} ({:?})",
                field.file_name(),
                field.content_type()
            );
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let bytes = upload.ok_or(ApiError::MissingFile)?;

    let classifier = Arc::clone(&state.classifier);
    let start = Instant::now();
    let prediction = tokio::task::spawn_blocking(move || classifier.predict_bytes(&bytes)).await??;
    let elapsed = start.elapsed();

    metrics::histogram!("plantcare_inference_seconds").record(elapsed.as_secs_f64());
    metrics::counter!("plantcare_predictions_total", "label" => prediction.label.clone()).increment(1);
    debug!(
        "Predicted {} ({}%) in {}ms",
        prediction.label,
        prediction.confidence,
        elapsed.as_millis()
    );

    Ok(Json(prediction))
}

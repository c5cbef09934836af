//! ONNX Inference Engine
//!
//! Loads the leaf disease classifier once and maps its logits onto the
//! label table through softmax and argmax.

mod backend;
mod engine;
mod labels;
#[cfg(feature = "ort")]
mod ort_backend;
mod postprocess;
mod tract_backend;

pub use backend::{Backend, BackendKind, MockBackend};
pub use engine::{Classification, Classifier, EngineConfig, Prediction};
pub use labels::{LabelTable, DEFAULT_LABELS};
#[cfg(feature = "ort")]
pub use ort_backend::OrtBackend;
pub use postprocess::{argmax, round_percentage, softmax};
pub use tract_backend::TractBackend;

pub use preprocess::{ImagePreprocessor, PreprocessConfig, PreprocessError};

use thiserror::Error;

/// Errors during model loading and inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Invalid output shape: expected {expected} class scores, got {actual}")]
    InvalidOutputShape { expected: usize, actual: usize },
    #[error("Label table has {labels} entries but the model outputs {outputs} classes")]
    LabelMismatch { labels: usize, outputs: usize },
    #[error("Model produced non-finite class scores")]
    NonFiniteOutput,
    #[error("Label table error: {0}")]
    Labels(String),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
}

impl InferenceError {
    /// Whether the error was caused by the uploaded data rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InferenceError::Preprocess(PreprocessError::Decode(_) | PreprocessError::Empty)
        )
    }
}

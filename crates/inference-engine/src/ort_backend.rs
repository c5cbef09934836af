//! ONNX Runtime backend

use crate::backend::check_input_dims;
use crate::{Backend, InferenceError};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, error, info};

/// ONNX model executed by ONNX Runtime on the CPU execution provider
pub struct OrtBackend {
    session: Session,
    output_classes: Option<usize>,
}

impl OrtBackend {
    /// Create a session and check its first input against `input_shape`
    ///
    /// Symbolic input axes are accepted; fixed ones must match, so a model
    /// trained at another resolution fails here instead of on every request.
    pub fn load(path: impl AsRef<Path>, input_shape: [usize; 4]) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX model from {} (onnxruntime)", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                error!("Failed to load model: {}", e);
                InferenceError::ModelLoad(format!("{}: {}", path.display(), e))
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| InferenceError::ModelLoad(format!("{}: graph has no inputs", path.display())))?;
        match input.input_type.tensor_dimensions() {
            Some(dims) => check_input_dims(input_shape, dims)?,
            None => {
                return Err(InferenceError::InvalidInputShape {
                    expected: format!("{:?}", input_shape),
                    actual: format!("non-tensor input `{}`", input.name),
                })
            }
        }

        let output_classes = session
            .outputs
            .first()
            .and_then(|output| output.output_type.tensor_dimensions())
            .and_then(|dims| dims.last().copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);

        info!(
            "Model loaded: input {:?}, output classes {:?}",
            input_shape, output_classes
        );

        Ok(Self {
            session,
            output_classes,
        })
    }
}

impl Backend for OrtBackend {
    fn name(&self) -> &'static str {
        "ort"
    }

    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let inputs = ort::inputs![input.view()].map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let logits = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let logits: Vec<f32> = logits.iter().copied().collect();
        debug!("onnxruntime produced {} logits", logits.len());
        Ok(logits)
    }

    fn output_classes(&self) -> Option<usize> {
        self.output_classes
    }
}

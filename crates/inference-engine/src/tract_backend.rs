//! tract-onnx backend

use crate::{Backend, InferenceError};
use ndarray::Array4;
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX model executed by the pure-Rust tract runtime
pub struct TractBackend {
    plan: TractPlan,
    input_shape: [usize; 4],
    output_classes: Option<usize>,
}

impl TractBackend {
    /// Load and optimize an ONNX graph with its first input pinned to `input_shape`
    ///
    /// A graph that cannot accept the pinned shape fails here instead of on
    /// the first request.
    pub fn load(path: impl AsRef<Path>, input_shape: [usize; 4]) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX model from {} (tract)", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact(input_shape).into()))
            .and_then(|m| m.into_optimized())
            .map_err(|e| InferenceError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let output_classes = model
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));

        let plan = model
            .into_runnable()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        info!(
            "Model loaded: input {:?}, output classes {:?}",
            input_shape, output_classes
        );

        Ok(Self {
            plan,
            input_shape,
            output_classes,
        })
    }
}

impl Backend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        if input.shape() != &self.input_shape[..] {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", self.input_shape),
                actual: format!("{:?}", input.shape()),
            });
        }

        let data = input.as_standard_layout();
        let data = data
            .as_slice()
            .ok_or_else(|| InferenceError::InferenceFailed("input tensor is not contiguous".into()))?;

        let tensor = Tensor::from_shape(&self.input_shape, data)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let logits = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".into()))?
            .as_slice::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?
            .to_vec();

        debug!("tract produced {} logits", logits.len());
        Ok(logits)
    }

    fn output_classes(&self) -> Option<usize> {
        self.output_classes
    }
}

//! Inference backends

use crate::InferenceError;
use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

/// A loaded model session able to score one image tensor
///
/// Implementations are created once and shared across request handlers,
/// so `run` takes `&self` and must be safe to call concurrently.
pub trait Backend: Send + Sync {
    /// Short name used in logs and the health endpoint
    fn name(&self) -> &'static str;

    /// Run a forward pass on a `[1, 3, H, W]` tensor and return the class logits
    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    /// Number of classes the model outputs, when the graph declares it
    fn output_classes(&self) -> Option<usize>;
}

/// Check a graph's declared input dimensions against the tensor the preprocessor builds
///
/// Non-positive dimensions are symbolic in the graph and accept any size.
#[cfg_attr(not(feature = "ort"), allow(dead_code))]
pub(crate) fn check_input_dims(expected: [usize; 4], declared: &[i64]) -> Result<(), InferenceError> {
    let compatible = declared.len() == expected.len()
        && declared
            .iter()
            .zip(expected.iter())
            .all(|(&d, &e)| d <= 0 || d as usize == e);

    if compatible {
        Ok(())
    } else {
        Err(InferenceError::InvalidInputShape {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", declared),
        })
    }
}

/// Which backend to construct at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pure-Rust tract runtime
    #[default]
    Tract,
    /// ONNX Runtime (requires the `ort` feature)
    Ort,
    /// No model; deterministic scores derived from the image
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Tract => "tract",
            BackendKind::Ort => "ort",
            BackendKind::Mock => "mock",
        }
    }
}

/// Model-free backend for development and tests
///
/// Logits are a fixed function of the per-channel means of the input, so
/// identical images always score identically and different colors favour
/// different classes.
#[derive(Debug, Clone)]
pub struct MockBackend {
    classes: usize,
}

impl MockBackend {
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let shape = input.shape();
        if shape[0] != 1 || shape[1] != 3 {
            return Err(InferenceError::InvalidInputShape {
                expected: "[1, 3, H, W]".to_string(),
                actual: format!("{:?}", shape),
            });
        }

        let means: Vec<f32> = input
            .axis_iter(Axis(1))
            .map(|channel| channel.mean().unwrap_or(0.0))
            .collect();

        let logits = (0..self.classes)
            .map(|i| {
                let phase = i as f32 / self.classes.max(1) as f32;
                means[i % 3] * (1.0 + phase) - means[(i + 1) % 3] * phase
            })
            .collect();

        Ok(logits)
    }

    fn output_classes(&self) -> Option<usize> {
        Some(self.classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_output_width() {
        let backend = MockBackend::new(5);
        let logits = backend.run(&Array4::zeros((1, 3, 4, 4))).unwrap();
        assert_eq!(logits.len(), 5);
        assert_eq!(backend.output_classes(), Some(5));
    }

    #[test]
    fn test_mock_rejects_bad_shape() {
        let backend = MockBackend::new(5);
        let result = backend.run(&Array4::zeros((1, 1, 4, 4)));
        assert!(matches!(result, Err(InferenceError::InvalidInputShape { .. })));
    }

    #[test]
    fn test_input_dims_exact_match() {
        assert!(check_input_dims([1, 3, 224, 224], &[1, 3, 224, 224]).is_ok());
    }

    #[test]
    fn test_input_dims_dynamic_axes() {
        assert!(check_input_dims([1, 3, 224, 224], &[-1, 3, 224, 224]).is_ok());
        assert!(check_input_dims([1, 3, 224, 224], &[0, 3, -1, -1]).is_ok());
    }

    #[test]
    fn test_input_dims_size_mismatch() {
        let err = check_input_dims([1, 3, 224, 224], &[1, 3, 256, 256]).unwrap_err();
        match err {
            InferenceError::InvalidInputShape { expected, actual } => {
                assert_eq!(expected, "[1, 3, 224, 224]");
                assert_eq!(actual, "[1, 3, 256, 256]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_input_dims_rank_mismatch() {
        assert!(check_input_dims([1, 3, 224, 224], &[1, 224, 224]).is_err());
        assert!(check_input_dims([1, 3, 224, 224], &[1, 1, 224, 224]).is_err());
    }

    #[test]
    fn test_mock_is_deterministic() {
        let backend = MockBackend::new(7);
        let input = Array4::from_shape_fn((1, 3, 8, 8), |(_, c, y, x)| (c * 64 + y * 8 + x) as f32 / 100.0);
        assert_eq!(backend.run(&input).unwrap(), backend.run(&input).unwrap());
    }
}

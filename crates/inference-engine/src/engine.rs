//! Classifier: preprocessing, forward pass and label lookup

use crate::postprocess::{argmax, round_percentage, softmax};
use crate::{Backend, BackendKind, InferenceError, LabelTable, MockBackend, TractBackend};
use preprocess::{ImagePreprocessor, PreprocessConfig, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Predicted class with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class name from the label table
    pub label: String,
    /// Probability as a percentage in [0, 100], two decimals
    pub confidence: f64,
}

/// Full outcome of one forward pass
#[derive(Debug, Clone)]
pub struct Classification {
    /// Index of the most probable class
    pub index: usize,
    /// Label at `index`
    pub label: String,
    /// Softmax distribution over all classes, in label order
    pub probabilities: Vec<f64>,
}

impl Classification {
    /// Probability of the selected class (0.0 to 1.0)
    pub fn probability(&self) -> f64 {
        self.probabilities[self.index]
    }

    pub fn into_prediction(self) -> Prediction {
        Prediction {
            confidence: round_percentage(self.probability()),
            label: self.label,
        }
    }
}

/// Model and label configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Serialized ONNX graph
    #[serde(rename = "path")]
    pub model_path: PathBuf,
    /// Optional newline-separated label file replacing the built-in table
    pub labels_path: Option<PathBuf>,
    /// Runtime used to execute the graph
    pub backend: BackendKind,
    /// Resize and normalization constants
    pub preprocess: PreprocessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.onnx"),
            labels_path: None,
            backend: BackendKind::Tract,
            preprocess: PreprocessConfig::default(),
        }
    }
}

/// Leaf disease classifier
///
/// Built once at startup and shared read-only between requests.
pub struct Classifier {
    backend: Box<dyn Backend>,
    labels: LabelTable,
    preprocessor: ImagePreprocessor,
}

impl Classifier {
    /// Assemble a classifier, checking the label table against the model output width
    pub fn new(
        backend: Box<dyn Backend>,
        labels: LabelTable,
        preprocessor: ImagePreprocessor,
    ) -> Result<Self, InferenceError> {
        match backend.output_classes() {
            Some(outputs) if outputs != labels.len() => {
                return Err(InferenceError::LabelMismatch {
                    labels: labels.len(),
                    outputs,
                });
            }
            Some(_) => {}
            None => warn!(
                "{} backend does not declare its output width; label count checked per request",
                backend.name()
            ),
        }

        Ok(Self {
            backend,
            labels,
            preprocessor,
        })
    }

    /// Build the classifier described by `config`
    pub fn load(config: &EngineConfig) -> Result<Self, InferenceError> {
        let preprocessor = ImagePreprocessor::new(config.preprocess.clone())?;

        let labels = match &config.labels_path {
            Some(path) => LabelTable::from_file(path)?,
            None => {
                info!("Using built-in label table");
                LabelTable::default()
            }
        };

        let backend: Box<dyn Backend> = match config.backend {
            BackendKind::Tract => Box::new(TractBackend::load(
                &config.model_path,
                preprocessor.input_shape(),
            )?),
            #[cfg(feature = "ort")]
            BackendKind::Ort => Box::new(crate::OrtBackend::load(
                &config.model_path,
                preprocessor.input_shape(),
            )?),
            #[cfg(not(feature = "ort"))]
            BackendKind::Ort => {
                return Err(InferenceError::ModelLoad(
                    "built without onnxruntime support (enable the `ort` feature)".to_string(),
                ))
            }
            BackendKind::Mock => {
                warn!("Mock backend selected; predictions are not from a trained model");
                Box::new(MockBackend::new(labels.len()))
            }
        };

        info!(
            "Classifier ready: backend={}, classes={}, input={:?}",
            backend.name(),
            labels.len(),
            preprocessor.input_shape()
        );

        Self::new(backend, labels, preprocessor)
    }

    /// Classifier over the built-in labels with the mock backend
    pub fn mock() -> Result<Self, InferenceError> {
        let labels = LabelTable::default();
        Self::new(
            Box::new(MockBackend::new(labels.len())),
            labels,
            ImagePreprocessor::default(),
        )
    }

    /// Decode an uploaded image and predict its class
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction, InferenceError> {
        let img = preprocess::decode(bytes)?;
        self.predict_image(&img)
    }

    /// Predict the class of a decoded image
    pub fn predict_image(&self, img: &RgbImage) -> Result<Prediction, InferenceError> {
        Ok(self.classify(img)?.into_prediction())
    }

    /// Run the full pipeline and keep the probability distribution
    pub fn classify(&self, img: &RgbImage) -> Result<Classification, InferenceError> {
        let input = self.preprocessor.to_tensor(img);
        let logits = self.backend.run(&input)?;

        if logits.len() != self.labels.len() {
            return Err(InferenceError::InvalidOutputShape {
                expected: self.labels.len(),
                actual: logits.len(),
            });
        }

        let probabilities = softmax(&logits)?;
        let index = argmax(&probabilities).ok_or(InferenceError::InvalidOutputShape {
            expected: self.labels.len(),
            actual: 0,
        })?;
        let label = self
            .labels
            .get(index)
            .ok_or(InferenceError::InvalidOutputShape {
                expected: self.labels.len(),
                actual: logits.len(),
            })?
            .to_string();

        debug!(
            "Classified as {} (p={:.4})",
            label, probabilities[index]
        );

        Ok(Classification {
            index,
            label,
            probabilities,
        })
    }

    /// The `k` most probable classes, most probable first
    pub fn top_k(&self, img: &RgbImage, k: usize) -> Result<Vec<Prediction>, InferenceError> {
        let classification = self.classify(img)?;

        let mut ranked: Vec<(usize, f64)> =
            classification.probabilities.iter().copied().enumerate().collect();
        // Stable sort keeps the lower index first on equal probabilities
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(ranked
            .into_iter()
            .take(k)
            .filter_map(|(i, p)| {
                self.labels.get(i).map(|label| Prediction {
                    label: label.to_string(),
                    confidence: round_percentage(p),
                })
            })
            .collect())
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_LABELS;
    use image::{ImageFormat, Rgb};
    use ndarray::Array4;
    use std::io::Cursor;

    /// Backend returning fixed logits
    struct FixedBackend {
        logits: Vec<f32>,
        declared: Option<usize>,
    }

    impl Backend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn run(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            Ok(self.logits.clone())
        }

        fn output_classes(&self) -> Option<usize> {
            self.declared
        }
    }

    fn fixed(logits: Vec<f32>, declared: Option<usize>) -> Box<dyn Backend> {
        Box::new(FixedBackend { logits, declared })
    }

    fn three_labels() -> LabelTable {
        LabelTable::new(["healthy", "rust", "scab"]).unwrap()
    }

    fn leaf() -> RgbImage {
        RgbImage::from_fn(120, 90, |x, y| Rgb([(x * 2) as u8, 140, (y * 2) as u8]))
    }

    #[test]
    fn test_predicts_highest_logit() {
        let classifier = Classifier::new(
            fixed(vec![0.5, 3.0, 1.0], Some(3)),
            three_labels(),
            ImagePreprocessor::default(),
        )
        .unwrap();

        let prediction = classifier.predict_image(&leaf()).unwrap();
        assert_eq!(prediction.label, "rust");
        assert_eq!(prediction.confidence, 82.14);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let classifier = Classifier::mock().unwrap();
        let classification = classifier.classify(&leaf()).unwrap();

        let sum: f64 = classification.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(classification.probabilities.len(), classifier.labels().len());
    }

    #[test]
    fn test_prediction_in_label_table() {
        let classifier = Classifier::mock().unwrap();
        let prediction = classifier.predict_image(&leaf()).unwrap();

        assert!(classifier.labels().contains(&prediction.label));
        assert!((0.0..=100.0).contains(&prediction.confidence));
    }

    #[test]
    fn test_deterministic() {
        let classifier = Classifier::mock().unwrap();
        let mut buf = Cursor::new(Vec::new());
        leaf().write_to(&mut buf, ImageFormat::Png).unwrap();
        let bytes = buf.into_inner();

        assert_eq!(
            classifier.predict_bytes(&bytes).unwrap(),
            classifier.predict_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn test_label_mismatch_rejected_at_construction() {
        let result = Classifier::new(
            fixed(vec![0.0; 4], Some(4)),
            three_labels(),
            ImagePreprocessor::default(),
        );
        assert!(matches!(
            result,
            Err(InferenceError::LabelMismatch { labels: 3, outputs: 4 })
        ));
    }

    #[test]
    fn test_output_width_checked_per_request_when_undeclared() {
        let classifier = Classifier::new(
            fixed(vec![0.0; 5], None),
            three_labels(),
            ImagePreprocessor::default(),
        )
        .unwrap();

        let result = classifier.predict_image(&leaf());
        assert!(matches!(
            result,
            Err(InferenceError::InvalidOutputShape { expected: 3, actual: 5 })
        ));
    }

    #[test]
    fn test_non_image_bytes() {
        let classifier = Classifier::mock().unwrap();
        let result = classifier.predict_bytes(b"GIF? no, just text");

        let err = result.unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_non_finite_logits() {
        let classifier = Classifier::new(
            fixed(vec![0.0, f32::NAN, 1.0], Some(3)),
            three_labels(),
            ImagePreprocessor::default(),
        )
        .unwrap();

        let err = classifier.predict_image(&leaf()).unwrap_err();
        assert!(matches!(err, InferenceError::NonFiniteOutput));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_top_k_ordering() {
        let classifier = Classifier::new(
            fixed(vec![1.0, 3.0, 2.0], Some(3)),
            three_labels(),
            ImagePreprocessor::default(),
        )
        .unwrap();

        let top = classifier.top_k(&leaf(), 2).unwrap();
        let labels: Vec<_> = top.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["rust", "scab"]);
        assert!(top[0].confidence >= top[1].confidence);
    }

    #[test]
    fn test_load_mock_from_config() {
        let config = EngineConfig {
            backend: BackendKind::Mock,
            ..Default::default()
        };
        let classifier = Classifier::load(&config).unwrap();
        assert_eq!(classifier.backend_name(), "mock");
        assert_eq!(classifier.labels().len(), 71);
    }

    #[test]
    fn test_mock_passes_width_check() {
        let classifier = Classifier::mock().unwrap();
        assert_eq!(classifier.backend_name(), "mock");
        assert_eq!(classifier.labels().len(), DEFAULT_LABELS.len());
        assert_eq!(classifier.preprocessor().image_size(), 224);
    }

    #[test]
    fn test_mock_backend_against_short_table_rejected() {
        let result = Classifier::new(
            Box::new(MockBackend::new(DEFAULT_LABELS.len())),
            three_labels(),
            ImagePreprocessor::default(),
        );
        assert!(matches!(
            result,
            Err(InferenceError::LabelMismatch { labels: 3, outputs: 71 })
        ));
    }

    #[test]
    fn test_load_missing_model() {
        let config = EngineConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            ..Default::default()
        };
        assert!(matches!(
            Classifier::load(&config),
            Err(InferenceError::ModelLoad(_))
        ));
    }
}

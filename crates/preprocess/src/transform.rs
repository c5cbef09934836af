//! Resize, tensor conversion and per-channel normalization

use crate::PreprocessError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-channel mean used when the classifier was trained (RGB order)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation used when the classifier was trained (RGB order)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Side length of the square model input
    pub image_size: u32,
    /// Channel means, applied after scaling to [0, 1]
    pub mean: [f32; 3],
    /// Channel standard deviations
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl PreprocessConfig {
    /// Check the constants can produce a finite tensor
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.image_size == 0 {
            return Err(PreprocessError::InvalidConfig(
                "image_size must be greater than zero".to_string(),
            ));
        }
        if let Some(std) = self.std.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(PreprocessError::InvalidConfig(format!(
                "standard deviation must be positive, got {}",
                std
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(PreprocessError::InvalidConfig("mean must be finite".to_string()));
        }
        Ok(())
    }
}

/// Decode an uploaded image and convert it to 3-channel RGB
///
/// The container format is guessed from the content. Grayscale and
/// alpha images are converted; anything the `image` crate cannot decode
/// is rejected.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }

    let img = image::load_from_memory(bytes)?;
    debug!(
        "Decoded {}x{} image ({:?})",
        img.width(),
        img.height(),
        img.color()
    );

    Ok(img.into_rgb8())
}

/// Fixed preprocessing pipeline: resize, to tensor, normalize
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    /// Create a preprocessor, rejecting unusable constants
    pub fn new(config: PreprocessConfig) -> Result<Self, PreprocessError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Side length of the produced tensor
    pub fn image_size(&self) -> u32 {
        self.config.image_size
    }

    /// Shape of the produced tensor, `[1, 3, size, size]`
    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.config.image_size as usize;
        [1, 3, size, size]
    }

    /// Decode raw bytes and convert them to a model input tensor
    pub fn process(&self, bytes: &[u8]) -> Result<Array4<f32>, PreprocessError> {
        let img = decode(bytes)?;
        Ok(self.to_tensor(&img))
    }

    /// Convert an RGB image to a normalized `[1, 3, size, size]` tensor
    ///
    /// The image is stretched to the square size; aspect ratio is not kept.
    pub fn to_tensor(&self, img: &RgbImage) -> Array4<f32> {
        let size = self.config.image_size;
        let resized = if img.width() == size && img.height() == size {
            img.clone()
        } else {
            imageops::resize(img, size, size, FilterType::Triangle)
        };

        let mean = self.config.mean;
        let std = self.config.std;
        let mut tensor = Array4::<f32>::zeros(self.input_shape());
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y, x]] = (value - mean[c]) / std[c];
            }
        }

        tensor
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            config: PreprocessConfig::default(),
        }
    }
}

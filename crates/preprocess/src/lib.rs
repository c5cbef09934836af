//! Image Preprocessing
//!
//! Decodes uploaded leaf photographs and turns them into normalized NCHW
//! tensors matching the classifier's training-time transform.

mod error;
mod transform;

pub use error::PreprocessError;
pub use transform::{decode, ImagePreprocessor, PreprocessConfig, IMAGENET_MEAN, IMAGENET_STD};

pub use image::RgbImage;

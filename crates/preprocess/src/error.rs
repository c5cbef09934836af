//! Preprocessing Error Types

use thiserror::Error;

/// Errors while turning raw bytes into an input tensor
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// No bytes were supplied
    #[error("Image data is empty")]
    Empty,

    /// Bytes are not a decodable image
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Preprocessing constants are unusable
    #[error("Invalid preprocessing config: {0}")]
    InvalidConfig(String),
}

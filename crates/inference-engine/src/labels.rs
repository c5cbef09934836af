//! Class label table

use crate::InferenceError;
use std::path::Path;
use tracing::info;

/// Classes the bundled leaf disease model was trained on, in output order
pub const DEFAULT_LABELS: [&str; 71] = [
    "Apple-alternaria_leaf_spot",
    "Apple-black_rot",
    "Apple-brown_spot",
    "Apple-gray_spot",
    "Apple-healthy",
    "Apple-rust",
    "Apple-scab",
    "Bell_pepper-bacterial_spot",
    "Bell_pepper-healthy",
    "Blueberry-healthy",
    "Cassava-bacterial_blight",
    "Cassava-brown_streak_disease",
    "Cassava-green_mottle",
    "Cassava-healthy",
    "Cassava-mosaic_disease",
    "Cherry-healthy",
    "Cherry-powdery_mildew",
    "Coffee-healthy",
    "Coffee-red_spider_mite",
    "Coffee-rust",
    "Corn-common_rust",
    "Corn-gray_leaf_spot",
    "Corn-healthy",
    "Corn-northern_leaf_blight",
    "Grape_Leaf_blight",
    "Grape_black_measles",
    "Grape_black_rot",
    "Grape_healthy",
    "Orange-citrus_greening",
    "Peach-bacterial_spot",
    "Peach-healthy",
    "Potato_bacterial_wilt",
    "Potato_early_blight",
    "Potato_healthy",
    "Potato_late_blight",
    "Potato_leafroll_virus",
    "Potato_mosaic_virus",
    "Potato_nematode",
    "Potato_pests",
    "Potato_phytophthora",
    "Raspberry_healthy",
    "Rice_bacterial_blight",
    "Rice_blast",
    "Rice_brown_spot",
    "Rice_tungro",
    "Rose_healthy",
    "Rose_rust",
    "Rose_slug_sawfly",
    "Soybean_healthy",
    "Squash_powdery_mildew",
    "Strawberry_healthy",
    "Strawberry_leaf_scorch",
    "Sugercane_healthy",
    "Sugercane_mosaic",
    "Sugercane_red_rot",
    "Sugercane_rust",
    "Sugercane_yellow_leaf",
    "Tomato_bacterial_spot",
    "Tomato_early_blight",
    "Tomato_healthy",
    "Tomato_late_blight",
    "Tomato_leaf_curl",
    "Tomato_leaf_mold",
    "Tomato_mosaic_virus",
    "Tomato_septoria_leaf_spot",
    "Tomato_spider_mites",
    "Tomato_target_spot",
    "Watermelon_anthracnose",
    "Watermelon_downy_mildew",
    "Watermelon_healthy",
    "Watermelon_mosaic_virus",
];

/// Ordered mapping from model output index to class name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Build a table from names in output order
    pub fn new<I, S>(labels: I) -> Result<Self, InferenceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(InferenceError::Labels("label table is empty".to_string()));
        }
        Ok(Self { labels })
    }

    /// Parse one label per line; surrounding whitespace and blank lines are ignored
    pub fn parse(text: &str) -> Result<Self, InferenceError> {
        Self::new(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    /// Load a newline-separated labels file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::Labels(format!("{}: {}", path.display(), e)))?;
        let table = Self::parse(&text)?;
        info!("Loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Label at an output index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

//! Configuration types for segmentation and compositing

use crate::error::{Result, SegmentationError};
use crate::types::Dimensions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input resolution the pretrained MobileNet checkpoints were published with
pub const DEFAULT_MODEL_RESOLUTION: Dimensions = Dimensions {
    height: 128,
    width: 128,
};

/// Default cut-off for classifying a pixel as person
pub const DEFAULT_SEGMENTATION_THRESHOLD: f32 = 0.5;

/// Activation applied to the raw model output before resizing back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoreActivation {
    /// Model already emits probabilities for the person class
    None,
    /// Model emits person logits
    Sigmoid,
    /// Model emits two-class logits (background, person)
    #[default]
    Softmax,
}

impl std::fmt::Display for ScoreActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sigmoid => write!(f, "sigmoid"),
            Self::Softmax => write!(f, "softmax"),
        }
    }
}

/// Value range the model expects for input pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InputRange {
    /// `value / 255`
    #[default]
    ZeroToOne,
    /// `value / 127.5 - 1`
    MinusOneToOne,
}

impl InputRange {
    /// Map an 8-bit channel value into the model range
    #[must_use]
    pub fn normalize(self, value: u8) -> f32 {
        match self {
            Self::ZeroToOne => f32::from(value) / 255.0,
            Self::MinusOneToOne => f32::from(value) / 127.5 - 1.0,
        }
    }
}

/// Memory layout of the model input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, height, width, 3]`
    #[default]
    Nhwc,
    /// `[1, 3, height, width]`
    Nchw,
}

impl TensorLayout {
    /// Full input tensor shape for a given model resolution
    #[must_use]
    pub fn input_shape(self, resolution: Dimensions) -> [usize; 4] {
        let (h, w) = (resolution.height as usize, resolution.width as usize);
        match self {
            Self::Nhwc => [1, h, w, 3],
            Self::Nchw => [1, 3, h, w],
        }
    }
}

/// How the mask edge is rendered by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    /// Threshold into a 0/1 mask, hard edges
    #[default]
    Binary,
    /// Composite with the continuous person score as alpha
    Soft,
}

/// Configuration for the segmentation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Fixed model input resolution
    pub model_resolution: Dimensions,

    /// Scores strictly greater than this are classified as person
    pub segmentation_threshold: f32,

    /// Activation applied to the raw model output
    pub activation: ScoreActivation,

    /// Input pixel value range expected by the model
    pub input_range: InputRange,

    /// Input tensor layout expected by the model
    pub tensor_layout: TensorLayout,

    /// Mask edge rendering used by `draw`
    pub edge_mode: EdgeMode,

    /// Bypass the on-disk model cache
    pub disable_cache: bool,

    /// Custom model cache directory (None = XDG cache dir)
    pub cache_dir: Option<PathBuf>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model_resolution: DEFAULT_MODEL_RESOLUTION,
            segmentation_threshold: DEFAULT_SEGMENTATION_THRESHOLD,
            activation: ScoreActivation::default(),
            input_range: InputRange::default(),
            tensor_layout: TensorLayout::default(),
            edge_mode: EdgeMode::default(),
            disable_cache: false,
            cache_dir: None,
        }
    }
}

impl SegmentationConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use virtual_background::{EdgeMode, ScoreActivation, SegmentationConfig};
    ///
    /// let config = SegmentationConfig::builder()
    ///     .segmentation_threshold(0.7)
    ///     .activation(ScoreActivation::Sigmoid)
    ///     .edge_mode(EdgeMode::Soft)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.model_resolution.height, 128);
    /// ```
    #[must_use]
    pub fn builder() -> SegmentationConfigBuilder {
        SegmentationConfigBuilder::new()
    }

    /// Load a configuration from a JSON file, falling back to defaults for
    /// omitted fields
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SegmentationError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            SegmentationError::invalid_config(format!(
                "Failed to parse '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.segmentation_threshold)?;
        if self.model_resolution.is_empty() {
            return Err(SegmentationError::invalid_config(format!(
                "Model resolution must be positive, got {}",
                self.model_resolution
            )));
        }
        Ok(())
    }
}

/// Threshold must be a finite value in `[0, 1]`
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(SegmentationError::out_of_range(
            "segmentation threshold",
            threshold,
            "within [0, 1]",
        ));
    }
    Ok(())
}

/// Builder for `SegmentationConfig`
#[derive(Debug, Default)]
pub struct SegmentationConfigBuilder {
    config: SegmentationConfig,
}

impl SegmentationConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_resolution(mut self, height: u32, width: u32) -> Self {
        self.config.model_resolution = Dimensions::new(height, width);
        self
    }

    #[must_use]
    pub fn segmentation_threshold(mut self, threshold: f32) -> Self {
        self.config.segmentation_threshold = threshold;
        self
    }

    #[must_use]
    pub fn activation(mut self, activation: ScoreActivation) -> Self {
        self.config.activation = activation;
        self
    }

    #[must_use]
    pub fn input_range(mut self, range: InputRange) -> Self {
        self.config.input_range = range;
        self
    }

    #[must_use]
    pub fn tensor_layout(mut self, layout: TensorLayout) -> Self {
        self.config.tensor_layout = layout;
        self
    }

    #[must_use]
    pub fn edge_mode(mut self, edge_mode: EdgeMode) -> Self {
        self.config.edge_mode = edge_mode;
        self
    }

    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Threshold outside `[0, 1]`
    /// - Zero model resolution
    pub fn build(self) -> Result<SegmentationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SegmentationConfig::default();
        assert_eq!(config.model_resolution, Dimensions::new(128, 128));
        assert!((config.segmentation_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.activation, ScoreActivation::Softmax);
        assert_eq!(config.tensor_layout, TensorLayout::Nhwc);
        assert_eq!(config.edge_mode, EdgeMode::Binary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = SegmentationConfig::builder()
            .model_resolution(256, 144)
            .segmentation_threshold(0.7)
            .activation(ScoreActivation::Sigmoid)
            .input_range(InputRange::MinusOneToOne)
            .tensor_layout(TensorLayout::Nchw)
            .edge_mode(EdgeMode::Soft)
            .disable_cache(true)
            .cache_dir("/tmp/vbg")
            .build()
            .unwrap();

        assert_eq!(config.model_resolution, Dimensions::new(256, 144));
        assert_eq!(config.activation, ScoreActivation::Sigmoid);
        assert_eq!(config.input_range, InputRange::MinusOneToOne);
        assert_eq!(config.tensor_layout, TensorLayout::Nchw);
        assert_eq!(config.edge_mode, EdgeMode::Soft);
        assert!(config.disable_cache);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/vbg")));
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(SegmentationConfig::builder()
            .segmentation_threshold(1.5)
            .build()
            .is_err());
        assert!(SegmentationConfig::builder()
            .segmentation_threshold(f32::NAN)
            .build()
            .is_err());
        assert!(SegmentationConfig::builder()
            .model_resolution(0, 128)
            .build()
            .is_err());
    }

    #[test]
    fn test_input_range_normalization() {
        assert!((InputRange::ZeroToOne.normalize(0) - 0.0).abs() < 1e-6);
        assert!((InputRange::ZeroToOne.normalize(255) - 1.0).abs() < 1e-6);
        assert!((InputRange::MinusOneToOne.normalize(0) + 1.0).abs() < 1e-6);
        assert!((InputRange::MinusOneToOne.normalize(255) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_layout_shapes() {
        let res = Dimensions::new(128, 96);
        assert_eq!(TensorLayout::Nhwc.input_shape(res), [1, 128, 96, 3]);
        assert_eq!(TensorLayout::Nchw.input_shape(res), [1, 3, 128, 96]);
    }

    #[test]
    fn test_json_round_trip_with_partial_fields() {
        let json = r#"{ "segmentation_threshold": 0.6, "edge_mode": "soft", "activation": "sigmoid" }"#;
        let config: SegmentationConfig = serde_json::from_str(json).unwrap();
        assert!((config.segmentation_threshold - 0.6).abs() < 1e-6);
        assert_eq!(config.edge_mode, EdgeMode::Soft);
        assert_eq!(config.activation, ScoreActivation::Sigmoid);
        assert_eq!(config.model_resolution, DEFAULT_MODEL_RESOLUTION);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vbg.json");
        std::fs::write(&path, r#"{ "input_range": "minus-one-to-one" }"#).unwrap();
        let config = SegmentationConfig::from_json_file(&path).unwrap();
        assert_eq!(config.input_range, InputRange::MinusOneToOne);

        std::fs::write(&path, r#"{ "segmentation_threshold": 4.0 }"#).unwrap();
        assert!(SegmentationConfig::from_json_file(&path).is_err());
    }
}

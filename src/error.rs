//! Error types for segmentation and compositing operations

use crate::types::Dimensions;
use thiserror::Error;

/// Result type alias for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Error types surfaced by the segmentation pipeline
///
/// Nothing in the pipeline falls back silently: a failed load, an unreadable
/// frame or a missing model always reaches the caller as one of these.
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// Segmentation or drawing was requested before `init` completed
    #[error("Model has not been initialized")]
    UninitializedModel,

    /// The frame source does not match any recognized raster variant
    #[error("Unknown input type: {0}")]
    UnknownInputType(String),

    /// An image-like source has no resolvable height and width
    #[error("Missing dimensions: {0}")]
    MissingDimensions(String),

    /// Network or parse failure while loading the model artifact
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// The model forward pass failed or produced an unexpected tensor
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raster processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl SegmentationError {
    /// Create a new unknown input type error
    pub fn unknown_input<S: Into<String>>(msg: S) -> Self {
        Self::UnknownInputType(msg.into())
    }

    /// Create a new missing dimensions error
    pub fn missing_dimensions<S: Into<String>>(msg: S) -> Self {
        Self::MissingDimensions(msg.into())
    }

    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// I/O failure on `path`, keeping the original error kind
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let message = format!("cannot {} {}: {}", operation, path.as_ref().display(), error);
        Self::Io(std::io::Error::new(error.kind(), message))
    }

    /// Model load failure caused by the network or HTTP layer
    pub fn network_error<E: std::fmt::Display>(context: &str, error: E) -> Self {
        Self::ModelLoad(format!("{}: {}", context, error))
    }

    /// Parameter value outside its accepted range
    pub fn out_of_range<T: std::fmt::Display>(parameter: &str, value: T, accepted: &str) -> Self {
        Self::InvalidConfig(format!("{} must be {}, got {}", parameter, accepted, value))
    }

    /// Two rasters that must share a size do not
    pub fn size_mismatch(operation: &str, expected: Dimensions, actual: Dimensions) -> Self {
        Self::Processing(format!(
            "{} needs a {} raster, got {}",
            operation, expected, actual
        ))
    }
}

//! Frame to model tensor conversion
//!
//! Pads the frame to the model aspect ratio, resizes it to the model
//! resolution and writes the normalized pixels into a 4-D tensor in the
//! configured layout.

use crate::{
    config::{InputRange, SegmentationConfig, TensorLayout},
    error::Result,
    frame::Frame,
    geometry,
    types::{Dimensions, Padding},
};
use image::RgbImage;
use ndarray::Array4;

/// Model input together with what is needed to undo the geometry
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub tensor: Array4<f32>,
    pub padding: Padding,
    /// Frame size before padding
    pub original: Dimensions,
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess a frame for inference
    ///
    /// # Errors
    /// - `MissingDimensions` for an empty frame or model resolution
    pub fn prepare(frame: &Frame, config: &SegmentationConfig) -> Result<PreparedInput> {
        let original = frame.dimensions();
        let rgb = frame.to_rgb();
        let padded = geometry::pad_and_resize(&rgb, config.model_resolution)?;

        tracing::trace!(
            original = %original,
            padding = ?padded.padding.as_pairs(),
            "Padded frame to model aspect ratio"
        );

        let tensor = Self::canvas_to_tensor(&padded.resized, config.input_range, config.tensor_layout);
        Ok(PreparedInput {
            tensor,
            padding: padded.padding,
            original,
        })
    }

    /// Convert an RGB raster to a normalized tensor
    #[must_use]
    pub fn canvas_to_tensor(canvas: &RgbImage, range: InputRange, layout: TensorLayout) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let shape = layout.input_shape(Dimensions::new(height, width));
        let mut tensor = Array4::<f32>::zeros(shape);

        for (x, y, pixel) in canvas.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = range.normalize(pixel[c]);
                match layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                }
            }
        }

        tensor
    }
}

//! Core value types shared across the pipeline

use crate::error::{Result, SegmentationError};
use image::{GrayImage, Luma};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raster size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: u32,
    pub width: u32,
}

impl Dimensions {
    #[must_use]
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Number of pixels
    #[must_use]
    pub fn area(self) -> usize {
        self.height as usize * self.width as usize
    }

    /// True when either side is zero
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// `width / height`
    #[must_use]
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Border pixels added around a frame to reach the model aspect ratio
///
/// Produced by [`crate::geometry::compute_padding`] and consumed once by the
/// inverse transform. At most one of the two pairs is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Padding {
    #[must_use]
    pub const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Size of a frame once this padding is applied
    #[must_use]
    pub fn padded(self, dims: Dimensions) -> Dimensions {
        Dimensions::new(
            dims.height + self.top + self.bottom,
            dims.width + self.left + self.right,
        )
    }

    /// `[[top, bottom], [left, right]]`
    #[must_use]
    pub fn as_pairs(self) -> [[u32; 2]; 2] {
        [[self.top, self.bottom], [self.left, self.right]]
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self == Self::default()
    }
}

/// Continuous per-pixel scores, row-major, one value per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreField {
    data: Array2<f32>,
}

impl ScoreField {
    /// Wrap a `(height, width)` array
    #[must_use]
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Build from a flat row-major vector
    pub fn from_vec(dims: Dimensions, values: Vec<f32>) -> Result<Self> {
        let data = Array2::from_shape_vec((dims.height as usize, dims.width as usize), values)
            .map_err(|e| {
                SegmentationError::processing(format!(
                    "Score data does not match {} field: {}",
                    dims, e
                ))
            })?;
        Ok(Self { data })
    }

    /// Field of a constant value
    #[must_use]
    pub fn filled(dims: Dimensions, value: f32) -> Self {
        Self {
            data: Array2::from_elem((dims.height as usize, dims.width as usize), value),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        let (h, w) = self.data.dim();
        Dimensions::new(h as u32, w as u32)
    }

    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// Value at `(y, x)`, `0.0` outside the field
    #[must_use]
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.data.get((y, x)).copied().unwrap_or(0.0)
    }

    /// Flat row-major copy
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

}

/// Binary person mask at frame resolution
///
/// Flat row-major indicator values, `1` for person and `0` for background,
/// with exactly `height * width` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPersonMask")]
pub struct PersonMask {
    data: Vec<u8>,
    dimensions: Dimensions,
}

/// Unchecked wire form of [`PersonMask`]
#[derive(Deserialize)]
struct RawPersonMask {
    data: Vec<u8>,
    dimensions: Dimensions,
}

impl TryFrom<RawPersonMask> for PersonMask {
    type Error = SegmentationError;

    fn try_from(raw: RawPersonMask) -> Result<Self> {
        Self::new(raw.data, raw.dimensions)
    }
}

impl PersonMask {
    /// Create a mask, validating its length and values
    pub fn new(data: Vec<u8>, dimensions: Dimensions) -> Result<Self> {
        if data.len() != dimensions.area() {
            return Err(SegmentationError::processing(format!(
                "Mask has {} values but {} frame needs {}",
                data.len(),
                dimensions,
                dimensions.area()
            )));
        }
        if data.iter().any(|&v| v > 1) {
            return Err(SegmentationError::processing(
                "Mask values must be 0 or 1",
            ));
        }
        Ok(Self { data, dimensions })
    }

    /// Wrap indicator values already known to be 0 or 1
    pub(crate) fn from_indicators(data: Vec<u8>, dimensions: Dimensions) -> Self {
        debug_assert_eq!(data.len(), dimensions.area());
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image, values above 127 are person
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let data = image.pixels().map(|p| u8::from(p[0] > 127)).collect();
        Self {
            data,
            dimensions: Dimensions::new(height, width),
        }
    }

    /// Render as a grayscale image (0 or 255)
    #[must_use]
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.dimensions.width, self.dimensions.height, |x, y| {
            let idx = y as usize * self.dimensions.width as usize + x as usize;
            Luma([self.data.get(idx).copied().unwrap_or(0) * 255])
        })
    }

    /// Mask as a 0.0/1.0 alpha field
    #[must_use]
    pub fn to_score_field(&self) -> ScoreField {
        // length equals height * width for every constructed mask
        let width = self.dimensions.width as usize;
        let shape = (self.dimensions.height as usize, width);
        ScoreField::new(Array2::from_shape_fn(shape, |(y, x)| {
            f32::from(self.data[y * width + x])
        }))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of pixels classified as person
    #[must_use]
    pub fn person_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v == 1).count()
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.person_pixels();
        let background_pixels = total_pixels - foreground_pixels;
        let total = total_pixels.max(1) as f32;

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: foreground_pixels as f32 / total,
            background_ratio: background_pixels as f32 / total,
        }
    }

    /// Save mask as PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_image()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Statistics about a person mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Per-frame timing breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTimings {
    /// Pad, resize and tensor conversion
    pub preprocessing_ms: u64,
    /// Model forward pass
    pub inference_ms: u64,
    /// Activation, resize back and threshold
    pub postprocessing_ms: u64,
    /// Background resolution and compositing
    pub compositing_ms: u64,
    /// End-to-end time for the frame
    pub total_ms: u64,
}

impl FrameTimings {
    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Preprocess: {}ms | Inference: {}ms | Postprocess: {}ms | Composite: {}ms",
            self.total_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.postprocessing_ms,
            self.compositing_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_helpers() {
        let dims = Dimensions::new(100, 200);
        assert_eq!(dims.area(), 20_000);
        assert!((dims.aspect_ratio() - 2.0).abs() < f64::EPSILON);
        assert!(!dims.is_empty());
        assert!(Dimensions::new(0, 10).is_empty());
        assert_eq!(dims.to_string(), "200x100");
    }

    #[test]
    fn test_padding_padded_size() {
        let padding = Padding::new(50, 50, 0, 0);
        assert_eq!(
            padding.padded(Dimensions::new(100, 200)),
            Dimensions::new(200, 200)
        );
        assert_eq!(padding.as_pairs(), [[50, 50], [0, 0]]);
        assert!(Padding::default().is_zero());
    }

    #[test]
    fn test_person_mask_validation() {
        let dims = Dimensions::new(2, 3);
        assert!(PersonMask::new(vec![0, 1, 0, 1, 1, 0], dims).is_ok());
        assert!(PersonMask::new(vec![0, 1, 0], dims).is_err());
        assert!(PersonMask::new(vec![0, 2, 0, 1, 1, 0], dims).is_err());
    }

    #[test]
    fn test_person_mask_deserialization_is_validated() {
        let mask: PersonMask =
            serde_json::from_str(r#"{"data":[1,0,0,1],"dimensions":{"height":2,"width":2}}"#)
                .unwrap();
        assert_eq!(mask.person_pixels(), 2);

        let short = r#"{"data":[1,1],"dimensions":{"height":2,"width":2}}"#;
        assert!(serde_json::from_str::<PersonMask>(short).is_err());

        let not_binary = r#"{"data":[1,0,3,1],"dimensions":{"height":2,"width":2}}"#;
        assert!(serde_json::from_str::<PersonMask>(not_binary).is_err());
    }

    #[test]
    fn test_person_mask_statistics() {
        let mask = PersonMask::new(vec![1, 1, 1, 0], Dimensions::new(2, 2)).unwrap();
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.foreground_pixels, 3);
        assert_eq!(stats.background_pixels, 1);
        assert!((stats.foreground_ratio - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_person_mask_image_conversion() {
        let mask = PersonMask::new(vec![0, 1, 1, 0], Dimensions::new(2, 2)).unwrap();
        let image = mask.to_image();
        assert_eq!(image.get_pixel(1, 0)[0], 255);
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(PersonMask::from_image(&image), mask);

        let field = mask.to_score_field();
        assert!((field.get(0, 1) - 1.0).abs() < f32::EPSILON);
        assert!(field.get(1, 1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_score_field_access() {
        let field = ScoreField::from_vec(Dimensions::new(2, 2), vec![0.0, 0.25, 0.5, 1.5]).unwrap();
        assert_eq!(field.dimensions(), Dimensions::new(2, 2));
        assert!((field.get(1, 0) - 0.5).abs() < f32::EPSILON);
        assert!(field.get(5, 5).abs() < f32::EPSILON);
        assert_eq!(field.to_vec(), vec![0.0, 0.25, 0.5, 1.5]);
        assert!(ScoreField::from_vec(Dimensions::new(2, 2), vec![0.0]).is_err());
    }
}

//! Raster sources and their normalization into a single in-memory frame
//!
//! Every input the pipeline accepts (static images, video frames, canvases,
//! raw pixel buffers, encoded bytes) resolves to a [`Frame`] before any
//! geometry runs. Each source variant has its own rule for which size wins:
//!
//! - images and canvases prefer their displayed size, then their natural size
//! - video prefers explicitly set size attributes over the decoded size
//! - raw buffers carry explicit height and width
//!
//! A zero-sized result is a [`SegmentationError::MissingDimensions`] error
//! rather than an empty raster.

use crate::compositor::Canvas;
use crate::error::{Result, SegmentationError};
use crate::geometry;
use crate::types::Dimensions;
use image::{DynamicImage, GenericImageView, ImageReader, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// A decoded still image with an optional displayed size
#[derive(Debug, Clone)]
pub struct ImageElement {
    pub pixels: DynamicImage,
    /// Rendered size, ignored when either side is zero
    pub display_size: Option<Dimensions>,
}

/// The current frame of a live video
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Decoded frame; reports 0x0 until stream metadata has loaded
    pub pixels: DynamicImage,
    /// Explicitly configured height and width, preferred over the decoded size
    pub size_attributes: Option<Dimensions>,
}

/// Pre-decoded pixel buffer with explicit size
#[derive(Debug, Clone)]
pub struct RawPixels {
    pub data: Vec<u8>,
    pub dimensions: Dimensions,
    /// 3 (RGB) or 4 (RGBA)
    pub channels: u8,
}

/// Any raster source the pipeline accepts
#[derive(Debug, Clone)]
pub enum FrameSource {
    Image(ImageElement),
    Video(VideoFrame),
    Canvas(Canvas),
    Raw(RawPixels),
    /// Encoded image bytes (PNG, JPEG)
    Encoded(Vec<u8>),
}

impl FrameSource {
    /// Static image displayed at its natural size
    #[must_use]
    pub fn image(pixels: DynamicImage) -> Self {
        Self::Image(ImageElement {
            pixels,
            display_size: None,
        })
    }

    /// Video frame without size attributes
    #[must_use]
    pub fn video(pixels: DynamicImage) -> Self {
        Self::Video(VideoFrame {
            pixels,
            size_attributes: None,
        })
    }

    /// Raw RGB/RGBA buffer
    #[must_use]
    pub fn raw(data: Vec<u8>, height: u32, width: u32, channels: u8) -> Self {
        Self::Raw(RawPixels {
            data,
            dimensions: Dimensions::new(height, width),
            channels,
        })
    }

    /// Open an image file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).map_err(|e| SegmentationError::file_io_error("read image", path, &e))?;
        Ok(Self::Encoded(bytes))
    }

    /// Short name of the variant for logs and errors
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Canvas(_) => "canvas",
            Self::Raw(_) => "raw",
            Self::Encoded(_) => "encoded",
        }
    }

    /// Resolve the frame size according to the variant's rule
    ///
    /// Only the header of encoded bytes is read here.
    pub fn dimensions(&self) -> Result<Dimensions> {
        match self {
            Self::Image(element) => size_from_image_like(element),
            Self::Video(video) => size_from_video(video),
            Self::Canvas(canvas) => non_empty(canvas.dimensions(), "canvas"),
            Self::Raw(raw) => {
                validate_raw(raw)?;
                non_empty(raw.dimensions, "raw pixel buffer")
            },
            Self::Encoded(bytes) => {
                let (width, height) = ImageReader::new(Cursor::new(bytes))
                    .with_guessed_format()
                    .map_err(|e| {
                        SegmentationError::unknown_input(format!("unreadable image bytes: {}", e))
                    })?
                    .into_dimensions()
                    .map_err(|e| {
                        SegmentationError::unknown_input(format!("undecodable image header: {}", e))
                    })?;
                non_empty(Dimensions::new(height, width), "encoded image")
            },
        }
    }
}

impl From<DynamicImage> for FrameSource {
    fn from(image: DynamicImage) -> Self {
        Self::image(image)
    }
}

impl From<RgbaImage> for FrameSource {
    fn from(image: RgbaImage) -> Self {
        Self::image(DynamicImage::ImageRgba8(image))
    }
}

fn non_empty(dims: Dimensions, what: &str) -> Result<Dimensions> {
    if dims.is_empty() {
        return Err(SegmentationError::missing_dimensions(format!(
            "{} reports {}; height and width must be positive",
            what, dims
        )));
    }
    Ok(dims)
}

fn size_from_image_like(element: &ImageElement) -> Result<Dimensions> {
    if let Some(display) = element.display_size {
        if !display.is_empty() {
            return Ok(display);
        }
    }
    let (width, height) = element.pixels.dimensions();
    non_empty(Dimensions::new(height, width), "image element")
}

fn size_from_video(video: &VideoFrame) -> Result<Dimensions> {
    if let Some(attributes) = video.size_attributes {
        return non_empty(attributes, "video size attributes");
    }
    let (width, height) = video.pixels.dimensions();
    non_empty(
        Dimensions::new(height, width),
        "video (metadata not loaded yet?)",
    )
}

fn validate_raw(raw: &RawPixels) -> Result<()> {
    if raw.channels != 3 && raw.channels != 4 {
        return Err(SegmentationError::unknown_input(format!(
            "raw pixel buffer with {} channels (expected 3 or 4)",
            raw.channels
        )));
    }
    let expected = raw.dimensions.area() * raw.channels as usize;
    if raw.data.len() != expected {
        return Err(SegmentationError::unknown_input(format!(
            "raw pixel buffer of {} bytes does not match {} x {} channels",
            raw.data.len(),
            raw.dimensions,
            raw.channels
        )));
    }
    Ok(())
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| SegmentationError::unknown_input(format!("undecodable image bytes: {}", e)))
}

/// RGBA raster at the resolved source size
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbaImage,
}

impl Frame {
    /// Normalize any source into a frame at its resolved dimensions
    ///
    /// When the resolved size differs from the decoded pixel size (a
    /// displayed or attribute size), the pixels are resampled to it.
    pub fn from_source(source: &FrameSource) -> Result<Self> {
        // Encoded bytes are decoded once below and sized by their pixels
        let resolved = match source {
            FrameSource::Encoded(_) => None,
            _ => Some(source.dimensions()?),
        };
        let rgba = match source {
            FrameSource::Image(element) => element.pixels.to_rgba8(),
            FrameSource::Video(video) => video.pixels.to_rgba8(),
            FrameSource::Canvas(canvas) => canvas.as_rgba().clone(),
            FrameSource::Raw(raw) => raw_to_rgba(raw)?,
            FrameSource::Encoded(bytes) => decode(bytes)?.to_rgba8(),
        };

        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(SegmentationError::missing_dimensions(format!(
                "{} source has no decoded pixels",
                source.kind()
            )));
        }
        let dims = resolved.unwrap_or(Dimensions::new(height, width));

        let image = if (width, height) == (dims.width, dims.height) {
            rgba
        } else {
            tracing::debug!(
                source = source.kind(),
                decoded = %format!("{}x{}", width, height),
                resolved = %dims,
                "Resampling source to resolved size"
            );
            geometry::resize_bilinear(&rgba, dims)
        };

        Ok(Self { image })
    }

    /// Wrap an RGBA image directly
    pub fn from_rgba(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        non_empty(Dimensions::new(height, width), "frame")?;
        Ok(Self { image })
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = self.image.dimensions();
        Dimensions::new(height, width)
    }

    #[must_use]
    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_rgba(self) -> RgbaImage {
        self.image
    }

    /// Drop the alpha channel
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        DynamicImage::ImageRgba8(self.image.clone()).to_rgb8()
    }
}

fn raw_to_rgba(raw: &RawPixels) -> Result<RgbaImage> {
    validate_raw(raw)?;
    let Dimensions { height, width } = raw.dimensions;
    let image = if raw.channels == 4 {
        RgbaImage::from_raw(width, height, raw.data.clone())
    } else {
        RgbImage::from_raw(width, height, raw.data.clone())
            .map(|rgb| DynamicImage::ImageRgb8(rgb).to_rgba8())
    };
    image.ok_or_else(|| {
        SegmentationError::unknown_input(format!("raw pixel buffer cannot form a {} image", raw.dimensions))
    })
}

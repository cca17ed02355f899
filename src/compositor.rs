//! Output canvas and Porter-Duff compositing
//!
//! The compositor only ever sees rasters: a frame, an alpha field at the
//! frame's resolution and an already-resolved background. Effects are turned
//! into rasters beforehand by [`crate::effects::resolve_background`].

use crate::error::{Result, SegmentationError};
use crate::frame::Frame;
use crate::types::{Dimensions, ScoreField};
use image::{imageops, Rgba, RgbaImage};

/// Porter-Duff operator used when drawing onto a [`Canvas`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Source drawn on top of the destination
    #[default]
    SourceOver,
    /// Destination kept only where the source is opaque
    DestinationIn,
    /// Source drawn behind the destination
    DestinationOver,
}

/// RGBA drawing surface the processor renders into
///
/// Resizing a canvas clears it, mirroring how an HTML canvas behaves when
/// its width or height is assigned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    /// Transparent canvas of the given size
    #[must_use]
    pub fn new(dims: Dimensions) -> Self {
        Self {
            image: RgbaImage::new(dims.width, dims.height),
        }
    }

    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { image }
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

    /// Resize to `dims`, discarding the current contents
    pub fn resize(&mut self, dims: Dimensions) {
        self.image = RgbaImage::new(dims.width, dims.height);
    }

    /// Reset every pixel to transparent black
    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Draw `source` with its top-left corner at `(x, y)`
    ///
    /// Pixels of the canvas outside the source are treated as covered by a
    /// transparent source, which matters for [`CompositeOp::DestinationIn`].
    pub fn draw_image(&mut self, source: &RgbaImage, x: i64, y: i64, op: CompositeOp) {
        let (src_w, src_h) = source.dimensions();
        for (cx, cy, dst) in self.image.enumerate_pixels_mut() {
            let sx = i64::from(cx) - x;
            let sy = i64::from(cy) - y;
            let inside = sx >= 0 && sy >= 0 && sx < i64::from(src_w) && sy < i64::from(src_h);
            let src = if inside {
                *source.get_pixel(sx as u32, sy as u32)
            } else {
                Rgba([0, 0, 0, 0])
            };
            *dst = blend(*dst, src, op);
        }
    }

    /// Keep the canvas only where `alpha` is set (destination-in with the
    /// field as source alpha)
    pub fn stencil(&mut self, alpha: &ScoreField) -> Result<()> {
        if alpha.dimensions() != self.dimensions() {
            return Err(SegmentationError::size_mismatch(
                "stencil",
                self.dimensions(),
                alpha.dimensions(),
            ));
        }
        for (x, y, dst) in self.image.enumerate_pixels_mut() {
            let a = alpha.get(y as usize, x as usize).clamp(0.0, 1.0);
            let src = Rgba([0, 0, 0, (a * 255.0).round() as u8]);
            *dst = blend(*dst, src, CompositeOp::DestinationIn);
        }
        Ok(())
    }

    /// Draw `source` scaled to cover the whole canvas, anchored at the
    /// origin, with overflow cropped
    pub fn draw_to_fill(&mut self, source: &RgbaImage, op: CompositeOp) -> Result<()> {
        let filled = fill_to(source, self.dimensions())?;
        self.draw_image(&filled, 0, 0, op);
        Ok(())
    }
}

/// Scale factor that makes a `source` raster cover `canvas`
pub fn fill_scale(canvas: Dimensions, source: Dimensions) -> Result<f64> {
    if source.is_empty() {
        return Err(SegmentationError::missing_dimensions(format!(
            "background reports {}",
            source
        )));
    }
    let horizontal = f64::from(canvas.width) / f64::from(source.width);
    let vertical = f64::from(canvas.height) / f64::from(source.height);
    Ok(horizontal.max(vertical))
}

/// Crop the part of `source` that the fill scale maps onto `canvas` and
/// resize only that region to exactly `canvas`
///
/// Work is bounded by the canvas size, however elongated the source is.
pub fn fill_to(source: &RgbaImage, canvas: Dimensions) -> Result<RgbaImage> {
    let (src_w, src_h) = source.dimensions();
    let scale = fill_scale(canvas, Dimensions::new(src_h, src_w))?;

    let crop_w = ((f64::from(canvas.width) / scale).ceil() as u32).clamp(1, src_w);
    let crop_h = ((f64::from(canvas.height) / scale).ceil() as u32).clamp(1, src_h);
    let region = imageops::crop_imm(source, 0, 0, crop_w, crop_h).to_image();

    if (crop_w, crop_h) == (canvas.width, canvas.height) {
        return Ok(region);
    }
    Ok(imageops::resize(
        &region,
        canvas.width,
        canvas.height,
        imageops::FilterType::Triangle,
    ))
}

/// Composite `frame` over `background` using `alpha` as the person matte
///
/// The sequence is fixed: clear, draw the frame, stencil it with the matte,
/// then lay the fill-scaled background underneath. A binary matte gives
/// hard edges and a continuous one blends along the boundary.
pub fn composite(
    canvas: &mut Canvas,
    frame: &Frame,
    alpha: &ScoreField,
    background: &RgbaImage,
) -> Result<()> {
    let dims = frame.dimensions();
    if canvas.dimensions() != dims {
        canvas.resize(dims);
    }

    canvas.clear();
    canvas.draw_image(frame.as_rgba(), 0, 0, CompositeOp::SourceOver);
    canvas.stencil(alpha)?;
    canvas.draw_to_fill(background, CompositeOp::DestinationOver)?;
    Ok(())
}

/// Non-premultiplied Porter-Duff blend of one pixel
fn blend(dst: Rgba<u8>, src: Rgba<u8>, op: CompositeOp) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0;

    // (top colour, top alpha, bottom colour, bottom alpha)
    let (top, ta, bottom, ba) = match op {
        CompositeOp::SourceOver => (src, sa, dst, da),
        CompositeOp::DestinationOver => (dst, da, src, sa),
        CompositeOp::DestinationIn => {
            let out_a = da * sa;
            if out_a <= 0.0 {
                return Rgba([0, 0, 0, 0]);
            }
            return Rgba([dst[0], dst[1], dst[2], to_u8(out_a)]);
        },
    };

    let out_a = ta + ba * (1.0 - ta);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (f32::from(top[c]) * ta + f32::from(bottom[c]) * ba * (1.0 - ta)) / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = to_u8(out_a);
    Rgba(out)
}

fn to_u8(unit: f32) -> u8 {
    (unit * 255.0).round().clamp(0.0, 255.0) as u8
}

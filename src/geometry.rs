//! Aspect-preserving pad-and-resize and its inverse
//!
//! Frames are padded symmetrically with zeros until they match the model's
//! aspect ratio, then resized to the model resolution. Model output comes
//! back through [`remove_padding_and_resize_back`], which crops the region
//! that held the original frame and resamples it to the original size.
//!
//! Rounding of padding uses `f64::round` (half away from zero) so that the
//! forward and inverse transforms agree on the same integer borders.
//!
//! Both directions interpolate bilinearly from the four nearest samples.
//! Downscaling therefore point-samples instead of area-averaging.

use crate::error::{Result, SegmentationError};
use crate::types::{Dimensions, Padding, ScoreField};
use image::{imageops, ImageBuffer, Pixel};
use ndarray::Array2;

/// Compute the symmetric padding that brings `input` to the aspect ratio of
/// `target`
///
/// Only one pair is ever non-zero: left/right when the input is narrower
/// than the target, top/bottom otherwise. Equal aspect ratios give zero
/// padding.
#[must_use]
pub fn compute_padding(input: Dimensions, target: Dimensions) -> Padding {
    let target_aspect = target.aspect_ratio();
    let aspect = input.aspect_ratio();
    let height = f64::from(input.height);
    let width = f64::from(input.width);

    if aspect < target_aspect {
        let pad = (0.5 * (target_aspect * height - width)).round().max(0.0) as u32;
        Padding::new(0, 0, pad, pad)
    } else {
        let pad = (0.5 * ((1.0 / target_aspect) * width - height))
            .round()
            .max(0.0) as u32;
        Padding::new(pad, pad, 0, 0)
    }
}

/// Result of [`pad_and_resize`]
#[derive(Debug, Clone)]
pub struct PaddedImage<P: Pixel> {
    /// Raster at exactly the target resolution
    pub resized: ImageBuffer<P, Vec<P::Subpixel>>,
    /// Borders added before resizing
    pub padding: Padding,
}

/// Zero-pad `image` to the target aspect ratio and resize it bilinearly to
/// exactly `target`
pub fn pad_and_resize<P>(image: &ImageBuffer<P, Vec<u8>>, target: Dimensions) -> Result<PaddedImage<P>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = image.dimensions();
    let input = Dimensions::new(height, width);
    if input.is_empty() || target.is_empty() {
        return Err(SegmentationError::missing_dimensions(format!(
            "cannot pad {} raster to {}",
            input, target
        )));
    }

    let padding = compute_padding(input, target);
    let padded_dims = padding.padded(input);

    let padded = if padding.is_zero() {
        image.clone()
    } else {
        let mut canvas: ImageBuffer<P, Vec<u8>> =
            ImageBuffer::new(padded_dims.width, padded_dims.height);
        imageops::replace(
            &mut canvas,
            image,
            i64::from(padding.left),
            i64::from(padding.top),
        );
        canvas
    };

    let resized = if padded_dims == target {
        padded
    } else {
        resize_bilinear(&padded, target)
    };

    Ok(PaddedImage { resized, padding })
}

/// Normalized box `[y0, x0, y1, x1]` in source coordinates, `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub y0: f64,
    pub x0: f64,
    pub y1: f64,
    pub x1: f64,
}

impl CropBox {
    /// The whole source
    pub const FULL: Self = Self {
        y0: 0.0,
        x0: 0.0,
        y1: 1.0,
        x1: 1.0,
    };
}

/// Box occupied by the original frame inside its padded version
///
/// A one-pixel axis without padding has a zero denominator; that axis
/// collapses to the coordinate `0.0` so the single pixel is sampled as is.
#[must_use]
pub fn unpadded_crop_box(original: Dimensions, padding: Padding) -> CropBox {
    let (y0, y1) = axis_bounds(original.height, padding.top, padding.bottom);
    let (x0, x1) = axis_bounds(original.width, padding.left, padding.right);
    CropBox { y0, x0, y1, x1 }
}

fn axis_bounds(size: u32, pad_before: u32, pad_after: u32) -> (f64, f64) {
    let denominator = f64::from(size) + f64::from(pad_before) + f64::from(pad_after) - 1.0;
    if denominator <= 0.0 {
        return (0.0, 0.0);
    }
    let start = f64::from(pad_before) / denominator;
    let end = (f64::from(pad_before) + f64::from(size) - 1.0) / denominator;
    (start, end)
}

/// One output coordinate's bilinear sample: lower index, upper index, weight
#[derive(Debug, Clone, Copy)]
struct Sample {
    lower: usize,
    upper: usize,
    frac: f32,
}

/// Sample positions for `crop_and_resize` along one axis; `None` means the
/// position falls outside the source and is extrapolated as zero
fn crop_samples(source_len: usize, start: f64, end: f64, out_len: usize) -> Vec<Option<Sample>> {
    let max_index = source_len.saturating_sub(1) as f64;
    (0..out_len)
        .map(|i| {
            let pos = if out_len > 1 {
                start * max_index + i as f64 * (end - start) * max_index / (out_len - 1) as f64
            } else {
                0.5 * (start + end) * max_index
            };
            // Tolerate float drift at the box edges
            if pos < -1e-6 || pos > max_index + 1e-6 {
                return None;
            }
            let pos = pos.clamp(0.0, max_index);
            let lower = pos.floor();
            Some(Sample {
                lower: lower as usize,
                upper: pos.ceil() as usize,
                frac: (pos - lower) as f32,
            })
        })
        .collect()
}

/// Sample positions for a plain bilinear resize along one axis
///
/// Output index `i` reads source position `i * source_len / out_len`: no
/// corner alignment and no half-pixel offset.
fn resize_samples(source_len: usize, out_len: usize) -> Vec<Sample> {
    let scale = source_len as f64 / out_len as f64;
    let last = source_len.saturating_sub(1);
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * scale;
            let lower = (pos.floor() as usize).min(last);
            Sample {
                lower,
                upper: (lower + 1).min(last),
                frac: (pos - lower as f64).clamp(0.0, 1.0) as f32,
            }
        })
        .collect()
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn bilinear(source: &Array2<f32>, ys: &Sample, xs: &Sample) -> f32 {
    let top = lerp(source[[ys.lower, xs.lower]], source[[ys.lower, xs.upper]], xs.frac);
    let bottom = lerp(source[[ys.upper, xs.lower]], source[[ys.upper, xs.upper]], xs.frac);
    lerp(top, bottom, ys.frac)
}

/// Bilinear resize of an 8-bit raster to exactly `target`
#[must_use]
pub fn resize_bilinear<P>(image: &ImageBuffer<P, Vec<u8>>, target: Dimensions) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let mut out: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(target.width, target.height);
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return out;
    }

    let ys = resize_samples(src_h as usize, target.height as usize);
    let xs = resize_samples(src_w as usize, target.width as usize);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (sy, sx) = (&ys[y as usize], &xs[x as usize]);
        let corner = move |row: usize, col: usize| image.get_pixel(col as u32, row as u32).channels();
        let (tl, tr) = (corner(sy.lower, sx.lower), corner(sy.lower, sx.upper));
        let (bl, br) = (corner(sy.upper, sx.lower), corner(sy.upper, sx.upper));
        for (c, value) in pixel.channels_mut().iter_mut().enumerate() {
            let top = lerp(f32::from(tl[c]), f32::from(tr[c]), sx.frac);
            let bottom = lerp(f32::from(bl[c]), f32::from(br[c]), sx.frac);
            *value = lerp(top, bottom, sy.frac).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Crop the normalized `crop` box out of `field` and resample it bilinearly
/// to exactly `target`
///
/// Positions that land outside the source take the value `0.0`.
#[must_use]
pub fn crop_and_resize(field: &ScoreField, crop: CropBox, target: Dimensions) -> ScoreField {
    let source = field.view().to_owned();
    let (src_h, src_w) = source.dim();
    let (out_h, out_w) = (target.height as usize, target.width as usize);
    if src_h == 0 || src_w == 0 {
        return ScoreField::filled(target, 0.0);
    }

    let ys = crop_samples(src_h, crop.y0, crop.y1, out_h);
    let xs = crop_samples(src_w, crop.x0, crop.x1, out_w);
    let out = Array2::from_shape_fn((out_h, out_w), |(y, x)| match (&ys[y], &xs[x]) {
        (Some(sy), Some(sx)) => bilinear(&source, sy, sx),
        _ => 0.0,
    });
    ScoreField::new(out)
}

/// Undo [`pad_and_resize`] on a model-resolution field
///
/// The output always has exactly the `original` dimensions.
#[must_use]
pub fn remove_padding_and_resize_back(
    field: &ScoreField,
    original: Dimensions,
    padding: Padding,
) -> ScoreField {
    let crop = unpadded_crop_box(original, padding);
    tracing::trace!(
        ?crop,
        model = %field.dimensions(),
        original = %original,
        "Cropping padded field back to original frame"
    );
    crop_and_resize(field, crop, original)
}

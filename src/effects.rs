//! Backgrounds and symbolic background effects
//!
//! Every [`Background`] is resolved into a plain raster before compositing,
//! so the compositor never needs effect-specific code.

use crate::error::{Result, SegmentationError};
use crate::frame::Frame;
use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Background effect computed from the frame itself
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Effect {
    /// Gaussian-blurred copy of the frame; `radius` is the blur sigma in pixels
    Bokeh { radius: f32 },
}

impl Default for Effect {
    fn default() -> Self {
        Self::Bokeh { radius: 12.0 }
    }
}

/// What shows through where the mask is background
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// Replacement image, fill-scaled to the canvas
    Image(RgbaImage),
    /// Flat colour
    Solid(Rgba<u8>),
    Effect(Effect),
}

impl Background {
    /// Solid background from `#RRGGBB`, `RRGGBB` or `#RRGGBBAA`
    pub fn from_hex(color: &str) -> Result<Self> {
        parse_hex_color(color).map(Self::Solid)
    }
}

fn parse_hex_color(color: &str) -> Result<Rgba<u8>> {
    let hex = color.trim().trim_start_matches('#');
    let invalid = || {
        SegmentationError::invalid_config(format!(
            "Invalid colour '{}': expected RRGGBB or RRGGBBAA hex",
            color
        ))
    };
    if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(invalid)
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

/// Turn `background` into a raster for compositing behind `frame`
///
/// Effects and solid colours come out at the frame's size; images keep
/// their own size and are fill-scaled by the compositor.
///
/// # Errors
/// - `MissingDimensions` for an empty background image
/// - `InvalidConfig` for a negative or non-finite blur radius
pub fn resolve_background(background: &Background, frame: &Frame) -> Result<RgbaImage> {
    let dims = frame.dimensions();
    match background {
        Background::Image(image) => {
            let (width, height) = image.dimensions();
            if width == 0 || height == 0 {
                return Err(SegmentationError::missing_dimensions(format!(
                    "background image is {}x{}",
                    width, height
                )));
            }
            Ok(image.clone())
        },
        Background::Solid(color) => Ok(RgbaImage::from_pixel(dims.width, dims.height, *color)),
        Background::Effect(Effect::Bokeh { radius }) => {
            if !radius.is_finite() || *radius < 0.0 {
                return Err(SegmentationError::out_of_range(
                    "bokeh radius",
                    *radius,
                    "a finite value >= 0",
                ));
            }
            if *radius < f32::EPSILON {
                return Ok(frame.as_rgba().clone());
            }
            tracing::debug!(radius, frame = %dims, "Blurring frame for bokeh background");
            Ok(imageops::blur(frame.as_rgba(), *radius))
        },
    }
}

#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Virtual Background
//!
//! Person segmentation and virtual background compositing. Given a frame,
//! the library infers a per-pixel person mask with a pretrained
//! segmentation network and composites the person over a replacement
//! image, a solid colour or a blurred copy of the frame.
//!
//! The model itself is an opaque artifact behind [`SegmentationModel`].
//! What this crate owns is the geometry around it:
//!
//! - **Aspect-preserving padding**: frames are zero-padded symmetrically to
//!   the model's aspect ratio and resized to its fixed input resolution
//! - **Exact inverse**: model output is cropped back to the unpadded region
//!   and resampled to the original frame size
//! - **Mask post-processing**: class selection, activation and a strict
//!   threshold
//! - **Compositing**: Porter-Duff drawing with a fill-scaled background
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use virtual_background::{
//!     Background, Canvas, DrawParams, Effect, FrameSource, SegmentationConfig,
//!     SegmentationEngine, SegmentationProcessor,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SegmentationConfig::default();
//! let engine = Arc::new(SegmentationEngine::tract(&config)?);
//! engine.init("https://example.com/models/selfie_segmentation.onnx").await?;
//!
//! let processor = SegmentationProcessor::new(engine, config)?;
//! let source = FrameSource::open("me.jpg")?;
//!
//! // Binary person mask at the frame's resolution
//! let mask = processor.person_mask(&source, None).await?;
//! println!("{:.1}% person", mask.statistics().foreground_ratio * 100.0);
//!
//! // Composite over a blurred copy of the frame
//! let background = Background::Effect(Effect::Bokeh { radius: 12.0 });
//! let mut canvas = Canvas::default();
//! processor.draw(DrawParams::new(&source, &background, &mut canvas)).await?;
//! canvas.into_rgba().save("me_vbg.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `tract` (default): pure Rust ONNX inference backend
//! - `cli` (default): the `vbg` command-line tool and subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod download;
pub mod effects;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod inference;
pub mod mask;
pub mod processor;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use compositor::{Canvas, CompositeOp};
pub use config::{
    EdgeMode, InputRange, ScoreActivation, SegmentationConfig, SegmentationConfigBuilder,
    TensorLayout,
};
pub use effects::{Background, Effect};
pub use engine::{EngineState, SegmentationEngine};
pub use error::{Result, SegmentationError};
pub use frame::{Frame, FrameSource, ImageElement, RawPixels, VideoFrame};
pub use geometry::{compute_padding, remove_padding_and_resize_back};
pub use inference::{ModelLoader, SegmentationModel};
pub use processor::{DrawParams, MaskSource, SegmentationProcessor};
pub use types::{Dimensions, FrameTimings, MaskStatistics, Padding, PersonMask, ScoreField};

#[cfg(feature = "tract")]
pub use backends::{TractModelLoader, TractSegmentationModel};

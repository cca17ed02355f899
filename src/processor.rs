//! Per-frame segmentation and compositing pipeline
//!
//! `SegmentationProcessor` runs the whole chain for one frame:
//!
//! 1. resolve the source into a [`Frame`]
//! 2. pad to the model aspect ratio and resize to the model resolution
//! 3. run the model on the blocking pool
//! 4. select the person class, resize back and threshold
//! 5. composite the frame over the resolved background
//!
//! Mask computation and drawing share this one path; `draw` can skip steps
//! 2 to 4 when handed a precomputed mask.

use crate::{
    compositor::{self, Canvas},
    config::{validate_threshold, EdgeMode, SegmentationConfig},
    effects::{resolve_background, Background},
    engine::SegmentationEngine,
    error::{Result, SegmentationError},
    frame::{Frame, FrameSource},
    inference::SegmentationModel,
    mask,
    types::{FrameTimings, PersonMask, ScoreField},
    utils::ImagePreprocessor,
};
use image::imageops;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info_span, instrument, Instrument};

/// Where `draw` gets its person mask from
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MaskSource {
    /// Run the model on the frame
    #[default]
    Computed,
    /// Use a mask computed earlier, resized to the frame if needed
    Precomputed(PersonMask),
}

/// Inputs for one `draw` call
#[derive(Debug)]
pub struct DrawParams<'a> {
    pub source: &'a FrameSource,
    pub background: &'a Background,
    /// Output surface; resized to the frame before drawing
    pub canvas: &'a mut Canvas,
    /// Overrides the configured threshold
    pub threshold: Option<f32>,
    pub mask_source: MaskSource,
    /// Overrides the configured edge mode
    pub edge_mode: Option<EdgeMode>,
}

impl<'a> DrawParams<'a> {
    #[must_use]
    pub fn new(source: &'a FrameSource, background: &'a Background, canvas: &'a mut Canvas) -> Self {
        Self {
            source,
            background,
            canvas,
            threshold: None,
            mask_source: MaskSource::Computed,
            edge_mode: None,
        }
    }

    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn precomputed_mask(mut self, mask: PersonMask) -> Self {
        self.mask_source = MaskSource::Precomputed(mask);
        self
    }

    #[must_use]
    pub fn edge_mode(mut self, edge_mode: EdgeMode) -> Self {
        self.edge_mode = Some(edge_mode);
        self
    }
}

/// Runs segmentation and compositing against a shared engine
#[derive(Debug, Clone)]
pub struct SegmentationProcessor {
    engine: Arc<SegmentationEngine>,
    config: SegmentationConfig,
}

impl SegmentationProcessor {
    /// Processor over `engine`
    ///
    /// # Errors
    /// - `InvalidConfig` when `config` fails validation
    pub fn new(engine: Arc<SegmentationEngine>, config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SegmentationEngine> {
        &self.engine
    }

    /// Continuous person scores at the source's resolution
    ///
    /// # Errors
    /// - `UninitializedModel` before the engine is ready
    /// - `MissingDimensions` / `UnknownInputType` for unusable sources
    /// - `Inference` when the model fails or returns an unexpected tensor
    #[instrument(skip_all, fields(source = source.kind()))]
    pub async fn segment_scores(&self, source: &FrameSource) -> Result<ScoreField> {
        let model = self.engine.model()?;
        let frame = Frame::from_source(source)?;
        let mut timings = FrameTimings::default();
        self.scores_for_frame(model, &frame, &mut timings).await
    }

    /// Binary person mask at the source's resolution
    ///
    /// Scores strictly greater than the threshold are person; `None` uses
    /// the configured threshold.
    ///
    /// # Errors
    /// - `UninitializedModel` before the engine is ready
    /// - `InvalidConfig` for a threshold outside `[0, 1]`
    /// - Any error from [`Self::segment_scores`]
    #[instrument(skip_all, fields(source = source.kind()))]
    pub async fn person_mask(
        &self,
        source: &FrameSource,
        threshold: Option<f32>,
    ) -> Result<PersonMask> {
        let threshold = self.resolve_threshold(threshold)?;
        let model = self.engine.model()?;
        let frame = Frame::from_source(source)?;
        let mut timings = FrameTimings::default();
        let scores = self.scores_for_frame(model, &frame, &mut timings).await?;
        let mask = mask::threshold_scores(&scores, threshold);

        debug!(
            person_pixels = mask.person_pixels(),
            total = mask.len(),
            threshold,
            "Person mask computed"
        );
        Ok(mask)
    }

    /// Segment the source and paint it over `background` onto the canvas
    ///
    /// The canvas is resized to the frame's dimensions first, which also
    /// clears it.
    ///
    /// # Errors
    /// - `UninitializedModel` when the mask must be computed and the engine
    ///   is not ready
    /// - `MissingDimensions` for sources or backgrounds without a size
    /// - `InvalidConfig` for a bad threshold or effect parameter
    #[instrument(skip_all, fields(source = params.source.kind()))]
    pub async fn draw(&self, params: DrawParams<'_>) -> Result<FrameTimings> {
        let total_start = Instant::now();
        let DrawParams {
            source,
            background,
            canvas,
            threshold,
            mask_source,
            edge_mode,
        } = params;

        let threshold = self.resolve_threshold(threshold)?;
        let edge_mode = edge_mode.unwrap_or(self.config.edge_mode);
        let mut timings = FrameTimings::default();

        let frame = Frame::from_source(source)?;
        let dims = frame.dimensions();
        canvas.resize(dims);

        let alpha = match mask_source {
            MaskSource::Computed => {
                let model = self.engine.model()?;
                let scores = self.scores_for_frame(model, &frame, &mut timings).await?;
                match edge_mode {
                    EdgeMode::Binary => mask::threshold_scores(&scores, threshold).to_score_field(),
                    EdgeMode::Soft => scores,
                }
            },
            MaskSource::Precomputed(mask) => fit_mask(mask, &frame).to_score_field(),
        };

        let composite_start = Instant::now();
        {
            let _span = info_span!("compositing", frame = %dims, ?edge_mode).entered();
            let background = resolve_background(background, &frame)?;
            compositor::composite(canvas, &frame, &alpha, &background)?;
        }
        timings.compositing_ms = composite_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        debug!(timings = %timings.summary(), "Frame drawn");
        Ok(timings)
    }

    /// [`Self::draw`] for callers without an async runtime
    ///
    /// Spins up a current-thread runtime for the call, so it must not be
    /// used from inside an async context.
    pub fn draw_blocking(&self, params: DrawParams<'_>) -> Result<FrameTimings> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SegmentationError::processing(format!("Failed to start runtime: {e}")))?;
        runtime.block_on(self.draw(params))
    }

    fn resolve_threshold(&self, threshold: Option<f32>) -> Result<f32> {
        let threshold = threshold.unwrap_or(self.config.segmentation_threshold);
        validate_threshold(threshold)?;
        Ok(threshold)
    }

    async fn scores_for_frame(
        &self,
        model: Arc<dyn SegmentationModel>,
        frame: &Frame,
        timings: &mut FrameTimings,
    ) -> Result<ScoreField> {
        let preprocess_start = Instant::now();
        let prepared = {
            let _span = info_span!("preprocessing", frame = %frame.dimensions()).entered();
            ImagePreprocessor::prepare(frame, &self.config)?
        };
        timings.preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let input = prepared.tensor;
        let output = tokio::task::spawn_blocking(move || model.predict(&input))
            .instrument(info_span!("inference"))
            .await
            .map_err(|e| SegmentationError::inference(format!("Inference task failed: {e}")))??;
        timings.inference_ms = inference_start.elapsed().as_millis() as u64;

        let postprocess_start = Instant::now();
        let scores = {
            let _span = info_span!("postprocessing", output = ?output.shape()).entered();
            mask::scores_at_frame_resolution(
                &output,
                self.config.tensor_layout,
                self.config.activation,
                prepared.original,
                prepared.padding,
            )?
        };
        timings.postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

        Ok(scores)
    }
}

/// Nearest-neighbour resize of a mask to the frame, if sizes differ
fn fit_mask(mask: PersonMask, frame: &Frame) -> PersonMask {
    let dims = frame.dimensions();
    if mask.dimensions() == dims {
        return mask;
    }
    debug!(mask = %mask.dimensions(), frame = %dims, "Resizing precomputed mask to frame");
    let resized = imageops::resize(
        &mask.to_image(),
        dims.width,
        dims.height,
        imageops::FilterType::Nearest,
    );
    PersonMask::from_image(&resized)
}

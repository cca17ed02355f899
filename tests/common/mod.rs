//! Shared fakes and frame builders for integration tests
//!
//! The library's own test models are private to its unit tests, so the
//! integration suites carry their own.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use virtual_background::{
    FrameSource, ModelLoader, Result, SegmentationEngine, SegmentationError, SegmentationModel,
};

pub const PERSON: Rgba<u8> = Rgba([230, 40, 40, 255]);
pub const SCENERY: Rgba<u8> = Rgba([30, 60, 220, 255]);

/// Person rectangle occupying `[top, bottom) x [left, right)` of a frame
#[derive(Debug, Clone, Copy)]
pub struct PersonBox {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl PersonBox {
    pub fn contains(self, x: u32, y: u32) -> bool {
        (self.left..self.right).contains(&x) && (self.top..self.bottom).contains(&y)
    }

    /// Distance in pixels from `(x, y)` to the nearest box edge
    pub fn edge_distance(self, x: u32, y: u32) -> u32 {
        let dx = x.abs_diff(self.left).min(x.abs_diff(self.right));
        let dy = y.abs_diff(self.top).min(y.abs_diff(self.bottom));
        if self.contains(x, y) {
            dx.min(dy)
        } else if (self.left..self.right).contains(&x) {
            dy
        } else if (self.top..self.bottom).contains(&y) {
            dx
        } else {
            dx.max(dy)
        }
    }
}

/// Red "person" rectangle on a blue "scenery" backdrop
pub fn person_frame(width: u32, height: u32, person: PersonBox) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if person.contains(x, y) {
            PERSON
        } else {
            SCENERY
        }
    })
}

pub fn person_source(width: u32, height: u32, person: PersonBox) -> FrameSource {
    FrameSource::image(DynamicImage::ImageRgba8(person_frame(width, height, person)))
}

/// Two-class logits that call a pixel person when it is redder than it is blue
///
/// Layout follows the input: NHWC in, `[1, H, W, 2]` out; NCHW in,
/// `[1, 2, H, W]` out. Zero padding lands exactly on the 0.5 boundary.
#[derive(Debug, Default)]
pub struct RednessModel {
    calls: AtomicUsize,
}

impl RednessModel {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SegmentationModel for RednessModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        const GAIN: f32 = 30.0;
        self.calls.fetch_add(1, Ordering::SeqCst);
        match input.shape() {
            &[1, h, w, 3] => Ok(Array4::from_shape_fn((1, h, w, 2), |(_, y, x, c)| {
                if c == 0 {
                    0.0
                } else {
                    GAIN * (input[[0, y, x, 0]] - input[[0, y, x, 2]])
                }
            })),
            &[1, 3, h, w] => Ok(Array4::from_shape_fn((1, 2, h, w), |(_, c, y, x)| {
                if c == 0 {
                    0.0
                } else {
                    GAIN * (input[[0, 0, y, x]] - input[[0, 2, y, x]])
                }
            })),
            other => Err(SegmentationError::inference(format!(
                "unsupported input shape {:?}",
                other
            ))),
        }
    }
}

/// Loader handing out one shared model after an optional delay
#[derive(Debug)]
pub struct StubLoader {
    model: Arc<dyn SegmentationModel>,
    delay: Duration,
    failures: AtomicUsize,
    loads: AtomicUsize,
}

impl StubLoader {
    pub fn new(model: Arc<dyn SegmentationModel>) -> Self {
        Self {
            model,
            delay: Duration::ZERO,
            failures: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `count` loads
    pub fn fail_first(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self, url: &str) -> Result<Arc<dyn SegmentationModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(SegmentationError::model_load(format!("unreachable host for {}", url)));
        }
        Ok(Arc::clone(&self.model))
    }
}

/// Ready engine over a fresh [`RednessModel`], plus a handle to the model
pub async fn ready_engine() -> (Arc<SegmentationEngine>, Arc<RednessModel>) {
    let model = Arc::new(RednessModel::default());
    let loader = Arc::new(StubLoader::new(model.clone()));
    let engine = Arc::new(SegmentationEngine::new(loader));
    engine
        .init("memory://redness")
        .await
        .expect("stub load cannot fail");
    (engine, model)
}

pub fn assert_close(actual: Rgba<u8>, expected: Rgba<u8>, tolerance: u8) {
    for c in 0..4 {
        assert!(
            actual[c].abs_diff(expected[c]) <= tolerance,
            "channel {} differs: {:?} vs {:?}",
            c,
            actual,
            expected
        );
    }
}

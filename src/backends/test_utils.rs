//! Deterministic models and loaders for unit tests
//!
//! None of these touch the network or a real ONNX graph.

use crate::{
    error::{Result, SegmentationError},
    inference::{ModelLoader, SegmentationModel},
};
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// Classifies a pixel as person when its red channel exceeds one half
///
/// Emits two-class logits `[1, H, W, 2]` for NHWC input (or `[1, 2, H, W]`
/// for NCHW) with background fixed at zero, so softmax gives
/// `sigmoid(gain * (red - 0.5))`.
#[derive(Debug, Clone)]
pub struct RedChannelModel {
    pub gain: f32,
    call_count: Arc<AtomicUsize>,
}

impl RedChannelModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gain: 40.0,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for RedChannelModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationModel for RedChannelModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let shape = input.shape();
        let gain = self.gain;
        if shape.get(3) == Some(&3) {
            let (h, w) = (shape[1], shape[2]);
            Ok(Array4::from_shape_fn((1, h, w, 2), |(_, y, x, c)| {
                if c == 0 {
                    0.0
                } else {
                    gain * (input[[0, y, x, 0]] - 0.5)
                }
            }))
        } else if shape.get(1) == Some(&3) {
            let (h, w) = (shape[2], shape[3]);
            Ok(Array4::from_shape_fn((1, 2, h, w), |(_, c, y, x)| {
                if c == 0 {
                    0.0
                } else {
                    gain * (input[[0, 0, y, x]] - 0.5)
                }
            }))
        } else {
            Err(SegmentationError::inference(format!(
                "RedChannelModel cannot handle input {:?}",
                shape
            )))
        }
    }
}

/// Emits the same person probability everywhere, single channel
#[derive(Debug, Clone)]
pub struct ConstantModel {
    pub probability: f32,
}

impl SegmentationModel for ConstantModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let shape = input.shape();
        let (h, w) = if shape.get(3) == Some(&3) {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[3])
        };
        Ok(Array4::from_elem((1, h, w, 1), self.probability))
    }
}

/// Always fails the forward pass
#[derive(Debug, Clone, Default)]
pub struct FailingModel;

impl SegmentationModel for FailingModel {
    fn predict(&self, _input: &Array4<f32>) -> Result<Array4<f32>> {
        Err(SegmentationError::inference("simulated inference failure"))
    }
}

/// Loader that counts calls, records URLs and can be made slow or failing
#[derive(Debug)]
pub struct CountingLoader {
    model: Arc<dyn SegmentationModel>,
    loads: AtomicUsize,
    urls: Mutex<Vec<String>>,
    delay: Duration,
    failures_remaining: AtomicUsize,
}

impl CountingLoader {
    #[must_use]
    pub fn new(model: Arc<dyn SegmentationModel>) -> Self {
        Self {
            model,
            loads: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every load
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` loads
    #[must_use]
    pub fn failing(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self, url: &str) -> Result<Arc<dyn SegmentationModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SegmentationError::model_load(format!(
                "simulated failure loading {}",
                url
            )));
        }
        Ok(Arc::clone(&self.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_red_channel_model_layouts() {
        let model = RedChannelModel::new();
        let nhwc = Array4::from_elem((1, 2, 3, 3), 1.0f32);
        assert_eq!(model.predict(&nhwc).unwrap().shape(), &[1, 2, 3, 2]);

        let nchw = Array4::from_elem((1, 3, 2, 3), 1.0f32);
        assert_eq!(model.predict(&nchw).unwrap().shape(), &[1, 2, 2, 3]);
        assert_eq!(model.calls(), 2);

        let bad = Array4::from_elem((1, 2, 2, 2), 1.0f32);
        assert!(model.predict(&bad).is_err());
    }

    #[tokio::test]
    async fn test_counting_loader_failures() {
        let loader = CountingLoader::new(Arc::new(FailingModel)).failing(1);
        assert!(loader.load("a").await.is_err());
        assert!(loader.load("b").await.is_ok());
        assert_eq!(loader.loads(), 2);
        assert_eq!(loader.urls(), vec!["a".to_string(), "b".to_string()]);
    }
}

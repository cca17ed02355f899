//! Model capabilities: loading an artifact and running a forward pass

use crate::error::Result;
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::Arc;

/// A loaded segmentation network
///
/// The model is read-only once loaded, so `predict` takes `&self` and a single
/// instance can be shared behind an `Arc` by every caller of the engine.
pub trait SegmentationModel: Send + Sync + std::fmt::Debug {
    /// Run the forward pass
    ///
    /// Input is `[1, H, W, 3]` or `[1, 3, H, W]` at the model resolution;
    /// output holds per-pixel class scores at the same resolution.
    ///
    /// # Errors
    /// - Input shape the model was not built for
    /// - Backend execution failures
    fn predict(&self, input: &Array4<f32>) -> Result<Array4<f32>>;
}

/// Turns a model URL into a ready-to-run [`SegmentationModel`]
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Fetch and parse the model at `url`
    ///
    /// # Errors
    /// - `ModelLoad` for network, filesystem or parse failures
    async fn load(&self, url: &str) -> Result<Arc<dyn SegmentationModel>>;
}

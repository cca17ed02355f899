//! Tract backend for segmentation models
//!
//! Pure Rust ONNX inference: no native runtime, no FFI boundary. The loader
//! fixes the input fact to the configured resolution and layout before
//! optimizing, so the runnable plan is specialised for one tensor shape.

use crate::config::SegmentationConfig;
use crate::download::ModelFetcher;
use crate::error::{Result, SegmentationError};
use crate::inference::{ModelLoader, SegmentationModel};
use async_trait::async_trait;
use instant::Instant;
use ndarray::{Array4, Ix4};
use std::sync::Arc;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A parsed and optimized ONNX segmentation network
#[derive(Debug)]
pub struct TractSegmentationModel {
    model: TractModel,
    input_shape: [usize; 4],
}

impl TractSegmentationModel {
    /// Parse ONNX bytes into a runnable model for `input_shape`
    ///
    /// # Errors
    /// - `ModelLoad` when the bytes are not a valid ONNX graph or the graph
    ///   cannot be specialised to the input shape
    pub fn from_bytes(bytes: &[u8], input_shape: [usize; 4]) -> Result<Self> {
        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| SegmentationError::model_load(format!("Failed to parse ONNX model: {e}")))?
            .with_input_fact(0, f32::fact(input_shape).into())
            .map_err(|e| SegmentationError::model_load(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| SegmentationError::model_load(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                SegmentationError::model_load(format!("Failed to create runnable model: {e}"))
            })?;

        Ok(Self { model, input_shape })
    }

    #[must_use]
    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }
}

impl SegmentationModel for TractSegmentationModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if input.shape() != self.input_shape {
            return Err(SegmentationError::inference(format!(
                "Input tensor {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let outputs = self
            .model
            .run(tvec![Tensor::from(input.clone()).into()])
            .map_err(|e| SegmentationError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| SegmentationError::inference("No output tensor found"))?
            .into_arc_tensor();

        let view = output.to_array_view::<f32>().map_err(|e| {
            SegmentationError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        view.to_owned().into_dimensionality::<Ix4>().map_err(|_| {
            SegmentationError::inference(format!("Expected 4D output tensor, got {:?}", view.shape()))
        })
    }
}

/// Loads ONNX models through [`ModelFetcher`] and builds them with tract
#[derive(Debug)]
pub struct TractModelLoader {
    fetcher: ModelFetcher,
    input_shape: [usize; 4],
}

impl TractModelLoader {
    /// Loader for models matching `config`'s resolution and layout
    pub fn new(config: &SegmentationConfig) -> Result<Self> {
        Ok(Self {
            fetcher: ModelFetcher::new(config)?,
            input_shape: config.tensor_layout.input_shape(config.model_resolution),
        })
    }

    /// Loader with an explicitly built fetcher
    #[must_use]
    pub fn with_fetcher(fetcher: ModelFetcher, config: &SegmentationConfig) -> Self {
        Self {
            fetcher,
            input_shape: config.tensor_layout.input_shape(config.model_resolution),
        }
    }
}

#[async_trait]
impl ModelLoader for TractModelLoader {
    async fn load(&self, url: &str) -> Result<Arc<dyn SegmentationModel>> {
        let start = Instant::now();
        let bytes = self.fetcher.fetch(url).await?;

        log::info!("Initializing Tract backend");
        #[allow(clippy::cast_precision_loss)]
        let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
        log::info!("Model size: {size_mb:.2} MB, input {:?}", self.input_shape);

        let input_shape = self.input_shape;
        // Graph optimization is CPU bound
        let model = tokio::task::spawn_blocking(move || {
            TractSegmentationModel::from_bytes(&bytes, input_shape)
        })
        .await
        .map_err(|e| SegmentationError::model_load(format!("Model build task failed: {e}")))??;

        log::info!(
            "Tract backend initialized in {}ms",
            start.elapsed().as_millis()
        );
        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_bytes_are_model_load_errors() {
        let err = TractSegmentationModel::from_bytes(b"not an onnx graph", [1, 128, 128, 3])
            .unwrap_err();
        assert!(matches!(err, SegmentationError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_loader_surfaces_parse_failure() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.onnx");
        std::fs::write(&path, b"\x00\x01garbage").unwrap();

        let config = SegmentationConfig::builder().disable_cache(true).build().unwrap();
        let loader = TractModelLoader::new(&config).unwrap();
        let err = loader.load(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, SegmentationError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_loader_surfaces_missing_file() {
        let config = SegmentationConfig::builder().disable_cache(true).build().unwrap();
        let loader = TractModelLoader::new(&config).unwrap();
        let err = loader.load("file:///no/such/model.onnx").await.unwrap_err();
        assert!(matches!(err, SegmentationError::ModelLoad(_)));
    }
}

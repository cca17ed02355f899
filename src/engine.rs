//! Model lifecycle: one shared model per engine, loaded at most once at a time
//!
//! An engine starts `Unloaded`. The first [`SegmentationEngine::init`] call
//! starts a load attempt; concurrent callers join that attempt instead of
//! starting their own, and every one of them receives the same
//! `Arc<dyn SegmentationModel>`. If the attempt fails, each joined caller sees
//! the error and the engine is `Unloaded` again. A later `init` starts a new
//! attempt; nothing retries on its own.
//!
//! A load only makes progress while some `init` future is polled. When every
//! caller of an unfinished attempt is dropped, the engine reports `Unloaded`
//! and the next `init` starts a fresh attempt.

use crate::error::{Result, SegmentationError};
use crate::inference::{ModelLoader, SegmentationModel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

/// Observable lifecycle of the engine's model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

type LoadOutcome = std::result::Result<Arc<dyn SegmentationModel>, String>;

/// One load of one URL, shared by everyone who joined it
#[derive(Debug)]
struct LoadAttempt {
    url: String,
    outcome: OnceCell<LoadOutcome>,
    /// `init` futures currently waiting on `outcome`
    waiters: AtomicUsize,
}

/// Registration of one `init` future on an attempt, released on drop
struct Waiter(Arc<LoadAttempt>);

impl Waiter {
    fn register(attempt: &Arc<LoadAttempt>) -> Self {
        attempt.waiters.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(attempt))
    }
}

impl std::ops::Deref for Waiter {
    type Target = LoadAttempt;

    fn deref(&self) -> &LoadAttempt {
        &self.0
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LoadAttempt {
    fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            outcome: OnceCell::new(),
            waiters: AtomicUsize::new(0),
        })
    }

    fn ready(url: &str, model: Arc<dyn SegmentationModel>) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            outcome: OnceCell::new_with(Some(Ok(model))),
            waiters: AtomicUsize::new(0),
        })
    }

    fn abandoned(&self) -> bool {
        self.outcome.get().is_none() && self.waiters.load(Ordering::SeqCst) == 0
    }

    fn failed(&self) -> bool {
        matches!(self.outcome.get(), Some(Err(_)))
    }

    fn model(&self) -> Option<Arc<dyn SegmentationModel>> {
        match self.outcome.get() {
            Some(Ok(model)) => Some(Arc::clone(model)),
            _ => None,
        }
    }
}

/// Handle owning the loaded segmentation model
pub struct SegmentationEngine {
    loader: Arc<dyn ModelLoader>,
    current: Mutex<Option<Arc<LoadAttempt>>>,
}

impl std::fmt::Debug for SegmentationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationEngine")
            .field("state", &self.state())
            .field("model_url", &self.model_url())
            .finish_non_exhaustive()
    }
}

impl SegmentationEngine {
    /// Engine that loads models through `loader`
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            current: Mutex::new(None),
        }
    }

    /// Engine that is already `Ready` with `model`
    #[must_use]
    pub fn with_model(
        loader: Arc<dyn ModelLoader>,
        url: &str,
        model: Arc<dyn SegmentationModel>,
    ) -> Self {
        Self {
            loader,
            current: Mutex::new(Some(LoadAttempt::ready(url, model))),
        }
    }

    /// Engine backed by the tract loader for `config`
    #[cfg(feature = "tract")]
    pub fn tract(config: &crate::config::SegmentationConfig) -> Result<Self> {
        let loader = crate::backends::TractModelLoader::new(config)?;
        Ok(Self::new(Arc::new(loader)))
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<LoadAttempt>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the in-flight or finished attempt, or start a new one
    ///
    /// Registration happens under the slot lock so an attempt being joined
    /// is never mistaken for an abandoned one.
    fn attempt_for(&self, url: &str) -> Waiter {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(attempt) if !attempt.failed() && !attempt.abandoned() => {
                if attempt.url != url {
                    warn!(
                        requested = url,
                        loaded = %attempt.url,
                        "Engine already has a model; ignoring different URL"
                    );
                }
                Waiter::register(attempt)
            },
            _ => {
                let attempt = LoadAttempt::new(url);
                *slot = Some(Arc::clone(&attempt));
                Waiter::register(&attempt)
            },
        }
    }

    /// Load the model at `model_url`, or return the one already loaded
    ///
    /// Idempotent: repeated and concurrent calls share a single load and
    /// resolve to pointer-equal models. Calling with a different URL once a
    /// model is loaded or loading keeps the existing model.
    ///
    /// Dropping the future cancels this caller's part in the load. If no
    /// other caller is waiting, the engine goes back to `Unloaded` until the
    /// next `init`.
    ///
    /// # Errors
    /// - `ModelLoad` when the load this call joined failed
    #[instrument(skip(self), fields(state = %self.state()))]
    pub async fn init(&self, model_url: &str) -> Result<Arc<dyn SegmentationModel>> {
        let attempt = self.attempt_for(model_url);
        let outcome = attempt
            .outcome
            .get_or_init(|| async {
                info!(url = %attempt.url, "Loading segmentation model");
                match self.loader.load(&attempt.url).await {
                    Ok(model) => {
                        info!(url = %attempt.url, "Segmentation model ready");
                        Ok(model)
                    },
                    Err(SegmentationError::ModelLoad(message)) => Err(message),
                    Err(other) => Err(other.to_string()),
                }
            })
            .await;

        match outcome {
            Ok(model) => Ok(Arc::clone(model)),
            Err(message) => {
                warn!(url = %attempt.url, error = %message, "Model load failed");
                Err(SegmentationError::ModelLoad(message.clone()))
            },
        }
    }

    /// The loaded model
    ///
    /// # Errors
    /// - `UninitializedModel` unless the engine is `Ready`
    pub fn model(&self) -> Result<Arc<dyn SegmentationModel>> {
        self.slot()
            .as_ref()
            .and_then(|attempt| attempt.model())
            .ok_or(SegmentationError::UninitializedModel)
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        match self.slot().as_ref() {
            None => EngineState::Unloaded,
            Some(attempt) if attempt.abandoned() => EngineState::Unloaded,
            Some(attempt) => match attempt.outcome.get() {
                None => EngineState::Loading,
                Some(Ok(_)) => EngineState::Ready,
                Some(Err(_)) => EngineState::Unloaded,
            },
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// URL of the loaded model, if any
    #[must_use]
    pub fn model_url(&self) -> Option<String> {
        self.slot()
            .as_ref()
            .filter(|attempt| attempt.model().is_some())
            .map(|attempt| attempt.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{CountingLoader, RedChannelModel};
    use std::time::Duration;

    fn engine_with(loader: CountingLoader) -> (SegmentationEngine, Arc<CountingLoader>) {
        let loader = Arc::new(loader);
        (SegmentationEngine::new(loader.clone()), loader)
    }

    #[tokio::test]
    async fn test_starts_unloaded() {
        let (engine, _) = engine_with(CountingLoader::new(Arc::new(RedChannelModel::new())));
        assert_eq!(engine.state(), EngineState::Unloaded);
        assert!(matches!(
            engine.model(),
            Err(SegmentationError::UninitializedModel)
        ));
        assert!(engine.model_url().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_init_loads_once() {
        let (engine, loader) = engine_with(
            CountingLoader::new(Arc::new(RedChannelModel::new()))
                .with_delay(Duration::from_millis(50)),
        );

        let (a, b, c) = tokio::join!(
            engine.init("model.onnx"),
            engine.init("model.onnx"),
            engine.init("model.onnx")
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(loader.loads(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(Arc::ptr_eq(&engine.model().unwrap(), &a));
    }

    #[tokio::test]
    async fn test_reports_loading_while_in_flight() {
        let (engine, _) = engine_with(
            CountingLoader::new(Arc::new(RedChannelModel::new()))
                .with_delay(Duration::from_millis(100)),
        );
        let engine = Arc::new(engine);
        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.init("model.onnx").await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.state(), EngineState::Loading);
        task.await.unwrap().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_failed_load_returns_to_unloaded() {
        let (engine, loader) = engine_with(
            CountingLoader::new(Arc::new(RedChannelModel::new()))
                .with_delay(Duration::from_millis(20))
                .failing(1),
        );

        let (a, b) = tokio::join!(engine.init("model.onnx"), engine.init("model.onnx"));
        assert!(matches!(a, Err(SegmentationError::ModelLoad(_))));
        assert!(matches!(b, Err(SegmentationError::ModelLoad(_))));
        assert_eq!(loader.loads(), 1);
        assert_eq!(engine.state(), EngineState::Unloaded);

        // Only an explicit call starts a new attempt
        engine.init("model.onnx").await.unwrap();
        assert_eq!(loader.loads(), 2);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_different_url_keeps_existing_model() {
        let (engine, loader) = engine_with(CountingLoader::new(Arc::new(RedChannelModel::new())));
        let first = engine.init("first.onnx").await.unwrap();
        let second = engine.init("second.onnx").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1);
        assert_eq!(loader.urls(), vec!["first.onnx".to_string()]);
        assert_eq!(engine.model_url().as_deref(), Some("first.onnx"));
    }

    #[tokio::test]
    async fn test_dropped_init_leaves_engine_unloaded() {
        let (engine, loader) = engine_with(
            CountingLoader::new(Arc::new(RedChannelModel::new()))
                .with_delay(Duration::from_millis(200)),
        );

        let timed_out = tokio::time::timeout(Duration::from_millis(10), engine.init("model.onnx")).await;
        assert!(timed_out.is_err());
        assert_eq!(loader.loads(), 1);
        assert_eq!(engine.state(), EngineState::Unloaded);
        assert!(engine.model_url().is_none());

        engine.init("model.onnx").await.unwrap();
        assert_eq!(loader.loads(), 2);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_with_model_is_ready() {
        let model: Arc<dyn SegmentationModel> = Arc::new(RedChannelModel::new());
        let loader = Arc::new(CountingLoader::new(Arc::clone(&model)));
        let engine = SegmentationEngine::with_model(loader.clone(), "preloaded", Arc::clone(&model));

        assert!(engine.is_ready());
        let loaded = engine.init("preloaded").await.unwrap();
        assert!(Arc::ptr_eq(&loaded, &model));
        assert_eq!(loader.loads(), 0);
    }
}

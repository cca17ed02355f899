//! Model artifact fetching
//!
//! Resolves a model URL to raw bytes. `http(s)://` URLs are streamed with
//! reqwest and, unless caching is disabled, stored in the [`ModelCache`]
//! through a temporary file that is renamed into place once complete.
//! `file://` URLs and plain paths are read from disk. Every failure is
//! reported as [`SegmentationError::ModelLoad`].

use crate::cache::ModelCache;
use crate::config::SegmentationConfig;
use crate::error::{Result, SegmentationError};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const READ_BUFFER_SIZE: usize = 8192;

static PARTIAL_DOWNLOADS: AtomicUsize = AtomicUsize::new(0);

/// Unique sibling of `final_path` for an in-flight download
///
/// Concurrent fetches of the same model, in this process or another, each
/// write their own file; the last rename wins with identical content.
fn partial_download_path(final_path: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .map_or_else(|| "model".into(), |name| name.to_string_lossy());
    let sequence = PARTIAL_DOWNLOADS.fetch_add(1, Ordering::Relaxed);
    final_path.with_file_name(format!(
        "{}.{}-{}.part",
        file_name,
        std::process::id(),
        sequence
    ))
}

/// Where a model URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    Remote(String),
    Local(PathBuf),
}

impl ModelLocation {
    /// Classify a URL or path
    #[must_use]
    pub fn parse(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            Self::Remote(url.to_string())
        } else if let Some(path) = url.strip_prefix("file://") {
            Self::Local(PathBuf::from(path))
        } else {
            Self::Local(PathBuf::from(url))
        }
    }
}

/// Downloads or reads model artifacts
#[derive(Debug)]
pub struct ModelFetcher {
    client: Client,
    cache: Option<ModelCache>,
}

impl ModelFetcher {
    /// Fetcher honouring the cache settings of `config`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize the model cache
    pub fn new(config: &SegmentationConfig) -> Result<Self> {
        let cache = if config.disable_cache {
            None
        } else if let Some(dir) = &config.cache_dir {
            Some(ModelCache::with_custom_cache_dir(dir)?)
        } else {
            Some(ModelCache::new()?)
        };
        Self::with_cache(cache)
    }

    /// Fetcher with an explicit cache, or none
    pub fn with_cache(cache: Option<ModelCache>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| SegmentationError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> Option<&ModelCache> {
        self.cache.as_ref()
    }

    /// Resolve `url` to the bytes of the model artifact
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match ModelLocation::parse(url) {
            ModelLocation::Local(path) => read_local(&path).await,
            ModelLocation::Remote(url) => match &self.cache {
                Some(cache) => self.fetch_cached(cache, &url).await,
                None => {
                    log::info!("Downloading model from {} (cache disabled)", url);
                    let mut reader = self.open_stream(&url).await?;
                    let mut bytes = Vec::new();
                    reader.read_to_end(&mut bytes).await.map_err(|e| {
                        SegmentationError::network_error("Failed to read download stream", e)
                    })?;
                    Ok(bytes)
                },
            },
        }
    }

    async fn fetch_cached(&self, cache: &ModelCache, url: &str) -> Result<Vec<u8>> {
        let model_id = ModelCache::url_to_model_id(url);
        let final_path = cache.get_model_path(&model_id);

        if cache.is_model_cached(&model_id) {
            log::info!("Using cached model {} for {}", model_id, url);
            return read_local(&final_path).await;
        }

        log::info!("Downloading model from {}", url);
        let temp_path = partial_download_path(&final_path);
        match self.download_to(url, &temp_path).await {
            Ok(()) => {
                tokio::fs::rename(&temp_path, &final_path)
                    .await
                    .map_err(|e| {
                        SegmentationError::model_load(format!(
                            "Failed to move download into cache '{}': {}",
                            final_path.display(),
                            e
                        ))
                    })?;
                log::info!("Cached model {}", model_id);
                read_local(&final_path).await
            },
            Err(e) => {
                if let Err(cleanup_err) = tokio::fs::remove_file(&temp_path).await {
                    log::warn!("Failed to clean up partial download: {}", cleanup_err);
                }
                Err(e)
            },
        }
    }

    async fn open_stream(&self, url: &str) -> Result<impl AsyncRead + Unpin> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SegmentationError::network_error(&format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(SegmentationError::model_load(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        Ok(StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        ))
    }

    async fn download_to(&self, url: &str, local_path: &Path) -> Result<()> {
        let mut stream = self.open_stream(url).await?;
        let mut file = tokio::fs::File::create(local_path).await.map_err(|e| {
            SegmentationError::model_load(format!(
                "Failed to create '{}': {}",
                local_path.display(),
                e
            ))
        })?;

        let mut downloaded = 0u64;
        let mut buffer = vec![0; READ_BUFFER_SIZE];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| SegmentationError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| {
                    SegmentationError::model_load(format!(
                        "Failed to write '{}': {}",
                        local_path.display(),
                        e
                    ))
                })?;
            downloaded += bytes_read as u64;
        }

        file.flush().await.map_err(|e| {
            SegmentationError::model_load(format!(
                "Failed to flush '{}': {}",
                local_path.display(),
                e
            ))
        })?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        SegmentationError::model_load(format!("Failed to read model '{}': {}", path.display(), e))
    })?;
    if bytes.is_empty() {
        return Err(SegmentationError::model_load(format!(
            "Model file '{}' is empty",
            path.display()
        )));
    }
    Ok(bytes)
}

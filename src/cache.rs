//! On-disk cache for downloaded model artifacts
//!
//! Artifacts live in an XDG-compliant directory, one file per model URL:
//! - Linux/macOS: `~/.cache/virtual-background/models/`
//! - Windows: `%LOCALAPPDATA%/virtual-background/models/`
//!
//! `VBG_CACHE_DIR` overrides the location.

use crate::error::{Result, SegmentationError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "VBG_CACHE_DIR";

const MODEL_EXTENSION: &str = "onnx";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier derived from its URL
    pub model_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Cache at the default location, created if missing
    ///
    /// # Errors
    /// - No user cache directory and no `VBG_CACHE_DIR`
    /// - Failed to create the directory
    pub fn new() -> Result<Self> {
        Self::with_custom_cache_dir(Self::default_cache_dir()?)
    }

    /// Cache rooted at `cache_dir`, created if missing
    pub fn with_custom_cache_dir<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                SegmentationError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                SegmentationError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("virtual-background")
            .join("models"))
    }

    /// Stable, filesystem-safe identifier for a model URL
    ///
    /// # Examples
    /// ```
    /// use virtual_background::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://example.com/selfie_segmentation.onnx");
    /// assert!(id.starts_with("model-"));
    /// assert_eq!(id.len(), "model-".len() + 16);
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("model-{}", hash.get(..16).unwrap_or(&hash))
    }

    /// Path where the artifact for `model_id` is (or would be) stored
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", model_id, MODEL_EXTENSION))
    }

    /// True when a non-empty artifact is stored for `model_id`
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        fs::metadata(self.get_model_path(model_id))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn get_current_cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// All cached artifacts, sorted by identifier
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            SegmentationError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                SegmentationError::file_io_error("read cache entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MODEL_EXTENSION) {
                continue;
            }
            let Some(model_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            models.push(CachedModelInfo {
                model_id: model_id.to_string(),
                path: path.clone(),
                size_bytes,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove every cached artifact, returning how many were deleted
    pub fn clear_all_models(&self) -> Result<usize> {
        let models = self.scan_cached_models()?;
        for model in &models {
            fs::remove_file(&model.path).map_err(|e| {
                SegmentationError::file_io_error("remove cached model", &model.path, &e)
            })?;
            log::debug!("Removed cached model {}", model.model_id);
        }
        Ok(models.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_url_to_model_id_is_stable() {
        let a = ModelCache::url_to_model_id("https://example.com/a.onnx");
        let b = ModelCache::url_to_model_id("https://example.com/a.onnx");
        let c = ModelCache::url_to_model_id("https://example.com/b.onnx");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-'));
    }

    #[test]
    fn test_custom_cache_dir_created() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("models");
        let cache = ModelCache::with_custom_cache_dir(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(cache.get_current_cache_dir(), root.as_path());
    }

    #[test]
    fn test_cached_lookup_and_scan() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        let id = ModelCache::url_to_model_id("https://example.com/m.onnx");
        assert!(!cache.is_model_cached(&id));

        fs::write(cache.get_model_path(&id), b"onnx bytes").unwrap();
        fs::write(temp.path().join("notes.txt"), b"ignored").unwrap();
        assert!(cache.is_model_cached(&id));

        let models = cache.scan_cached_models().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, id);
        assert_eq!(models[0].size_bytes, 10);

        assert_eq!(cache.clear_all_models().unwrap(), 1);
        assert!(!cache.is_model_cached(&id));
    }

    #[test]
    fn test_empty_file_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        fs::write(cache.get_model_path("model-empty"), b"").unwrap();
        assert!(!cache.is_model_cached("model-empty"));
    }
}

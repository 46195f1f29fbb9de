//! Model cache
//!
//! Maps model paths to load states. A path is loaded at most once: success
//! is cached until evicted, and a failed load is remembered and not retried.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{ModelLoader, OnnxModelLoader, SrModelHandle};

/// Cache shared between runs in one process; the lock serializes loads
pub type SharedModelCache = Arc<Mutex<ModelCache>>;

/// Load state of one model path
#[derive(Debug, Clone)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded(Arc<SrModelHandle>),
    LoadFailed(String),
}

/// `ModelState` without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Loaded,
    LoadFailed,
}

impl ModelState {
    pub fn status(&self) -> ModelStatus {
        match self {
            ModelState::Unloaded => ModelStatus::Unloaded,
            ModelState::Loading => ModelStatus::Loading,
            ModelState::Loaded(_) => ModelStatus::Loaded,
            ModelState::LoadFailed(_) => ModelStatus::LoadFailed,
        }
    }
}

/// Loaded models keyed by path
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    inference_timeout: Duration,
    entries: HashMap<PathBuf, ModelState>,
    loads: u64,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>, inference_timeout: Duration) -> Self {
        Self {
            loader,
            inference_timeout,
            entries: HashMap::new(),
            loads: 0,
        }
    }

    /// Cache backed by the ONNX Runtime loader
    pub fn onnx(inference_timeout: Duration) -> Self {
        Self::new(Arc::new(OnnxModelLoader), inference_timeout)
    }

    /// Wrap for sharing across runs
    pub fn into_shared(self) -> SharedModelCache {
        Arc::new(Mutex::new(self))
    }

    pub fn status(&self, path: &Path) -> ModelStatus {
        self.entries
            .get(path)
            .map(ModelState::status)
            .unwrap_or(ModelStatus::Unloaded)
    }

    /// Return the cached handle for `path`, loading it on first use
    pub fn load(&mut self, path: &Path) -> Result<Arc<SrModelHandle>> {
        match self.entries.get(path) {
            Some(ModelState::Loaded(handle)) => return Ok(handle.clone()),
            Some(ModelState::LoadFailed(reason)) => {
                return Err(Error::ModelLoad(format!(
                    "{} failed to load earlier: {}",
                    path.display(),
                    reason
                )))
            }
            Some(ModelState::Loading) => {
                return Err(Error::ModelLoad(format!(
                    "{} is already being loaded",
                    path.display()
                )))
            }
            Some(ModelState::Unloaded) | None => {}
        }

        self.entries.insert(path.to_path_buf(), ModelState::Loading);
        self.loads += 1;
        tracing::info!("Loading model {}", path.display());

        let result = self
            .loader
            .load(path)
            .and_then(|model| SrModelHandle::new(path, model, self.inference_timeout));

        match result {
            Ok(handle) => {
                let handle = Arc::new(handle);
                self.entries
                    .insert(path.to_path_buf(), ModelState::Loaded(handle.clone()));
                Ok(handle)
            }
            Err(e) => {
                tracing::error!("Model {} failed to load: {}", path.display(), e);
                self.entries
                    .insert(path.to_path_buf(), ModelState::LoadFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Forget a path, loaded or failed. Returns whether it was present.
    pub fn evict(&mut self, path: &Path) -> bool {
        let removed = self.entries.remove(path).is_some();
        if removed {
            tracing::debug!("Evicted model {}", path.display());
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Underlying loads performed, cache hits excluded
    pub fn load_count(&self) -> u64 {
        self.loads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use blockrank_core::{AlgorithmConfig, AlgorithmStore, Result};
use tracing::debug;

use crate::compiler::{compile, CompiledAlgorithm};

/// Compiled algorithms keyed by `(algorithm_id, version)`.
///
/// Compilation failures are never cached, so a broken description is
/// reported again on every lookup until it is fixed.
#[derive(Default)]
pub struct AlgorithmCache {
    entries: RwLock<HashMap<(String, String), Arc<CompiledAlgorithm>>>,
}

impl AlgorithmCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `algorithm_id` from `store` and return its compiled form,
    /// compiling only when this version has not been seen before.
    pub fn get_or_compile(&self, store: &dyn AlgorithmStore, algorithm_id: &str) -> Result<Arc<CompiledAlgorithm>> {
        let config = store.load(algorithm_id)?;
        self.get_or_insert(&config)
    }

    pub fn get_or_insert(&self, config: &AlgorithmConfig) -> Result<Arc<CompiledAlgorithm>> {
        let key = (config.algorithm_id.clone(), config.version.clone());
        if let Some(hit) = self.entries.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(compile(config)?);
        debug!(algorithm = %key.0, version = %key.1, "caching compiled algorithm");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(entries.entry(key).or_insert(compiled)))
    }

    /// Drop every cached version of `algorithm_id`.
    pub fn invalidate(&self, algorithm_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _), _| id != algorithm_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Filesystem algorithm store: one `<algorithm_id>.json` per algorithm.

use std::fs;
use std::path::{Path, PathBuf};

use crate::algorithm::AlgorithmConfig;
use crate::error::{Error, Result};
use crate::traits::AlgorithmStore;

#[derive(Debug, Clone)]
pub struct FsAlgorithmStore {
    root: PathBuf,
}

impl FsAlgorithmStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, algorithm_id: &str) -> Result<PathBuf> {
        if algorithm_id.is_empty() || algorithm_id.contains(['/', '\\']) || algorithm_id.starts_with('.') {
            return Err(Error::ConfigValidation(format!("invalid algorithm id '{algorithm_id}'")));
        }
        Ok(self.root.join(format!("{algorithm_id}.json")))
    }

    fn read(path: &Path) -> Result<AlgorithmConfig> {
        let raw = fs::read_to_string(path).map_err(|e| Error::Operation(format!("read {}: {e}", path.display())))?;
        AlgorithmConfig::from_json_str(&raw)
    }

    fn list_json_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        files.sort();
        files
    }
}

impl AlgorithmStore for FsAlgorithmStore {
    fn load(&self, algorithm_id: &str) -> Result<AlgorithmConfig> {
        let path = self.path_for(algorithm_id)?;
        if !path.is_file() {
            return Err(Error::NotFound(format!("algorithm '{algorithm_id}'")));
        }
        Self::read(&path)
    }

    fn list(&self) -> Result<Vec<AlgorithmConfig>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut algorithms = Vec::new();
        for path in self.list_json_files() {
            match Self::read(&path) {
                Ok(algorithm) => algorithms.push(algorithm),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable algorithm file"),
            }
        }
        Ok(algorithms)
    }

    fn save(&self, algorithm: &AlgorithmConfig) -> Result<()> {
        let path = self.path_for(&algorithm.algorithm_id)?;
        fs::create_dir_all(&self.root).map_err(|e| Error::Operation(format!("create {}: {e}", self.root.display())))?;
        if path.exists() {
            return Err(Error::AlreadyExists(format!("algorithm '{}'", algorithm.algorithm_id)));
        }
        fs::write(&path, algorithm.to_json_pretty()?)
            .map_err(|e| Error::Operation(format!("write {}: {e}", path.display())))
    }
}

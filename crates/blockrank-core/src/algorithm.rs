//! Declarative algorithm descriptions as stored on disk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::FailurePolicy;

fn default_version() -> String {
    "1.0".to_string()
}

fn default_enabled() -> bool {
    true
}

/// One entry of `components`. `block_type` stays a raw tag so that unknown
/// types are reported by the block registry rather than by serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl BlockConfig {
    pub fn new(block_type: impl Into<String>, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { block_type: block_type.into(), name: None, enabled: true, config }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Label used in logs and error messages: the block name, else its type.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.block_type)
    }
}

/// A complete algorithm description. `components` order is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub algorithm_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub name: String,
    pub components: Vec<BlockConfig>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

impl AlgorithmConfig {
    pub fn new(algorithm_id: impl Into<String>, name: impl Into<String>, components: Vec<BlockConfig>) -> Self {
        Self {
            algorithm_id: algorithm_id.into(),
            version: default_version(),
            name: name.into(),
            components,
            metadata: Map::new(),
            failure_policy: None,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::ConfigValidation(format!("malformed algorithm description: {e}")))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Operation(format!("serialize algorithm: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_description_with_defaults() {
        let raw = r#"{
            "algorithm_id": "hybrid-search-v1",
            "name": "Hybrid",
            "components": [
                {"type": "keyword_search", "config": {"fields": ["title^3", "description"]}},
                {"type": "rerank", "enabled": false}
            ],
            "metadata": {"status": "draft"}
        }"#;
        let algo = AlgorithmConfig::from_json_str(raw).expect("parse");
        assert_eq!(algo.version, "1.0");
        assert_eq!(algo.components.len(), 2);
        assert!(algo.components[0].enabled);
        assert!(!algo.components[1].enabled);
        assert!(algo.components[1].config.is_empty());
        assert_eq!(algo.metadata["status"], "draft");
        assert_eq!(algo.failure_policy, None);
    }

    #[test]
    fn missing_id_is_a_validation_error() {
        let err = AlgorithmConfig::from_json_str(r#"{"name": "x", "components": []}"#).expect_err("no id");
        assert_eq!(err.kind(), crate::ErrorKind::ConfigValidationError);
    }
}

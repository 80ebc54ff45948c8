//! Block type registry: maps a `type` tag to the constructor that validates
//! its config. The set of block types is closed.

use blockrank_core::{BlockConfig, Error, Result};

use crate::blocks::{Block, KeywordSearchBlock, MergeBlock, RerankBlock, VectorSearchBlock};

pub type BlockBuilder = fn(&BlockConfig) -> Result<Block>;

static REGISTRY: [(&str, BlockBuilder); 4] = [
    ("keyword_search", KeywordSearchBlock::from_config),
    ("vector_search", VectorSearchBlock::from_config),
    ("merge", MergeBlock::from_config),
    ("rerank", RerankBlock::from_config),
];

pub fn builder_for(block_type: &str) -> Option<BlockBuilder> {
    REGISTRY.iter().find(|(tag, _)| *tag == block_type).map(|(_, builder)| *builder)
}

pub fn known_types() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(tag, _)| *tag)
}

pub fn build_block(config: &BlockConfig) -> Result<Block> {
    let builder = builder_for(&config.block_type).ok_or_else(|| {
        Error::ConfigValidation(format!(
            "unknown block type '{}', expected one of {}",
            config.block_type,
            known_types().collect::<Vec<_>>().join(", ")
        ))
    })?;
    builder(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_tag_resolves() {
        for tag in known_types() {
            assert!(builder_for(tag).is_some(), "{tag}");
        }
    }

    #[test]
    fn unsupported_types_are_validation_errors() {
        for tag in ["hybrid_search", "filter", "boost", ""] {
            let err = build_block(&BlockConfig::new(tag, json!({}))).unwrap_err();
            assert!(matches!(err, Error::ConfigValidation(_)), "{tag}");
        }
    }
}

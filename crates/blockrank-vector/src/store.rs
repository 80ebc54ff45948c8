use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use blockrank_core::{apply_boost, matches_filters, BackendHit, Document, VectorQuery};

use crate::similarity::Similarity;

pub const STORE_FILE: &str = "vectors.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    /// Dense vectors keyed by field name.
    pub vectors: BTreeMap<String, Vec<f32>>,
    /// Remaining document fields, returned with hits and used for filtering.
    pub source: Map<String, Value>,
}

/// In-memory vector collection with exact scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    records: Vec<VectorRecord>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split each document into its vector fields and the rest. Documents
    /// without any of `vector_fields` are stored with no vectors.
    pub fn from_documents(documents: &[Document], vector_fields: &[String], show_progress: bool) -> Result<Self> {
        let pb = if show_progress { ProgressBar::new(documents.len() as u64) } else { ProgressBar::hidden() };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} vectors ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );
        let mut store = Self::new();
        for document in documents {
            let mut source = document.fields.clone();
            let mut vectors = BTreeMap::new();
            for field in vector_fields {
                if let Some(raw) = source.remove(field) {
                    vectors.insert(field.clone(), parse_vector(&raw).with_context(|| format!("document '{}'", document.id))?);
                }
            }
            store.insert(VectorRecord { id: document.id.clone(), vectors, source })?;
            pb.inc(1);
        }
        pb.finish_with_message("vectors loaded");
        Ok(store)
    }

    /// Add a record. Vectors must share the dimension of the field's existing vectors.
    pub fn insert(&mut self, record: VectorRecord) -> Result<()> {
        for (field, vector) in &record.vectors {
            if let Some(expected) = self.dimension(field) {
                if vector.len() != expected {
                    bail!(
                        "document '{}' has a {}-dimensional '{field}' vector, expected {expected}",
                        record.id,
                        vector.len()
                    );
                }
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self, field: &str) -> Option<usize> {
        self.records.iter().find_map(|r| r.vectors.get(field).map(Vec::len))
    }

    /// Top `k` records by similarity to the query vector, after filtering.
    /// Ties keep insertion order.
    pub fn search(&self, query: &VectorQuery) -> Result<Vec<BackendHit>> {
        let similarity = Similarity::parse(query.similarity.as_deref())?;
        let Some(dimension) = self.dimension(&query.field) else {
            bail!("no vectors stored for field '{}'", query.field);
        };
        if query.query_vector.len() != dimension {
            bail!(
                "query vector has {} dimensions but field '{}' has {dimension}",
                query.query_vector.len(),
                query.field
            );
        }

        let mut scored: Vec<(f64, &VectorRecord)> = self
            .records
            .iter()
            .filter(|r| query.filters.as_ref().map_or(true, |f| matches_filters(&r.source, f)))
            .filter_map(|r| r.vectors.get(&query.field).map(|v| (similarity.score(&query.query_vector, v), r)))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        // exact scoring: the best `k` of the candidate pool are the best `k` overall
        scored.truncate(query.k.min(query.num_candidates));

        let mut hits: Vec<BackendHit> = scored
            .into_iter()
            .map(|(score, record)| {
                let mut hit = BackendHit::new(record.id.clone(), score);
                hit.source_fields = record.source.clone();
                hit.index = query.index.clone();
                hit
            })
            .collect();
        apply_boost(&mut hits, query.boost);
        debug!(field = %query.field, hits = hits.len(), "vector search");
        Ok(hits)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);
        fs::write(&path, serde_json::to_vec(self)?).with_context(|| format!("writing {}", path.display()))?;
        info!(records = self.records.len(), path = %path.display(), "vector store saved");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(STORE_FILE);
        let raw = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn parse_vector(raw: &Value) -> Result<Vec<f32>> {
    let Value::Array(items) = raw else {
        bail!("vector field must be an array of numbers");
    };
    items
        .iter()
        .map(|v| match v.as_f64() {
            Some(x) if x.is_finite() => Ok(x as f32),
            _ => bail!("vector component {v} is not a finite number"),
        })
        .collect()
}

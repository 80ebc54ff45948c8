//! Domain types shared by blocks, fusion, and backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub type SourceFields = Map<String, Value>;

/// A hit as returned by a backend adapter, before the pipeline assigns
/// `rank` and `source_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHit {
    pub doc_id: String,
    pub score: f64,
    #[serde(default)]
    pub source_fields: SourceFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl BackendHit {
    pub fn new(doc_id: impl Into<String>, score: f64) -> Self {
        Self { doc_id: doc_id.into(), score, source_fields: Map::new(), index: None }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.source_fields.insert(name.into(), value.into());
        self
    }
}

/// One ranked hit flowing through the pipeline.
///
/// - `rank`: 1-based position in the result set that holds it
/// - `source_index`: 0-based position of the generation block that produced
///   it, among enabled generation blocks in declaration order; never changes
///   as the hit flows through merge and rerank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    pub rank: usize,
    #[serde(default)]
    pub source_fields: SourceFields,
    pub source_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl SearchHit {
    pub fn from_backend(hit: BackendHit, source_index: usize) -> Self {
        Self {
            doc_id: hit.doc_id,
            score: hit.score,
            rank: 0,
            source_fields: hit.source_fields,
            source_index,
            index: hit.index,
        }
    }
}

/// Ordered hits with unique `doc_id`s and dense ranks `1..=N`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SearchHit>", into = "Vec<SearchHit>")]
pub struct ResultSet {
    hits: Vec<SearchHit>,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keeps the given order. Repeated `doc_id`s are dropped (first occurrence
    /// wins) and ranks are re-assigned from position.
    pub fn from_ranked(hits: Vec<SearchHit>) -> Self {
        let mut seen = HashSet::with_capacity(hits.len());
        let mut kept: Vec<SearchHit> = hits.into_iter().filter(|h| seen.insert(h.doc_id.clone())).collect();
        for (i, hit) in kept.iter_mut().enumerate() {
            hit.rank = i + 1;
        }
        Self { hits: kept }
    }

    /// Stable sort by score descending, then as [`ResultSet::from_ranked`].
    pub fn from_scored(mut hits: Vec<SearchHit>) -> Self {
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self::from_ranked(hits)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<SearchHit> {
        self.hits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }

    pub fn get(&self, doc_id: &str) -> Option<&SearchHit> {
        self.hits.iter().find(|h| h.doc_id == doc_id)
    }

    pub fn doc_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.doc_id.as_str()).collect()
    }

    /// Keeps the first `n` hits; the prefix is already densely ranked.
    pub fn truncate(&mut self, n: usize) {
        self.hits.truncate(n);
    }
}

/// Deserialized hits go through [`ResultSet::from_ranked`].
impl From<Vec<SearchHit>> for ResultSet {
    fn from(hits: Vec<SearchHit>) -> Self {
        Self::from_ranked(hits)
    }
}

impl From<ResultSet> for Vec<SearchHit> {
    fn from(set: ResultSet) -> Self {
        set.hits
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a SearchHit;
    type IntoIter = std::slice::Iter<'a, SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// A document accepted by the local backends at ingest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: SourceFields,
}

/// How a generation stage reacts to a failing backend call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any backend failure aborts the execution.
    #[default]
    FailFast,
    /// A failing block contributes an empty result set and is reported in
    /// the response as a dropped source.
    Degrade,
}

/// Marker attached to a degraded response for each source that was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedSource {
    pub source_index: usize,
    pub block: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    /// Opaque backend filters forwarded with every generation call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
}

/// Triggers cancellation of every execution holding a matching [`CancelSignal`].
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

impl Canceller {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal { rx: self.tx.subscribe() }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// [`Canceller`] is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Per-request inputs. Never mutated by blocks.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub query_text: String,
    pub query_vector: Option<Vec<f32>>,
    pub index: Option<String>,
    pub overrides: RequestOverrides,
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelSignal>,
}

impl ExecutionContext {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self { query_text: query_text.into(), ..Self::default() }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.query_vector = Some(vector);
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.overrides.failure_policy = Some(policy);
        self
    }

    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.overrides.filters = Some(filters);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit::from_backend(BackendHit::new(id, score), 0)
    }

    #[test]
    fn from_scored_is_stable_and_dense() {
        let set = ResultSet::from_scored(vec![hit("a", 1.0), hit("b", 2.0), hit("c", 1.0)]);
        assert_eq!(set.doc_ids(), vec!["b", "a", "c"]);
        let ranks: Vec<usize> = set.iter().map(|h| h.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn from_ranked_drops_repeated_ids() {
        let set = ResultSet::from_ranked(vec![hit("a", 3.0), hit("a", 9.0), hit("b", 1.0)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a").map(|h| h.score), Some(3.0));
        assert_eq!(set.get("b").map(|h| h.rank), Some(2));
    }

    #[test]
    fn deserialized_sets_are_deduplicated_and_reranked() {
        let raw = serde_json::json!([
            {"doc_id": "a", "score": 2.0, "rank": 7, "source_index": 0},
            {"doc_id": "a", "score": 1.0, "rank": 8, "source_index": 1},
            {"doc_id": "b", "score": 1.0, "rank": 9, "source_index": 1}
        ]);
        let set: ResultSet = serde_json::from_value(raw).unwrap();
        assert_eq!(set.doc_ids(), vec!["a", "b"]);
        assert_eq!(set.iter().map(|h| h.rank).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(set.get("a").map(|h| h.source_index), Some(0));

        let round = serde_json::to_value(&set).unwrap();
        assert!(round.is_array());
    }

    #[tokio::test]
    async fn cancel_signal_resolves_after_cancel() {
        let canceller = Canceller::new();
        let signal = canceller.signal();
        assert!(!signal.is_cancelled());
        canceller.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }
}

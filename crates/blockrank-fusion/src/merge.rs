use std::collections::{BTreeMap, HashMap, HashSet};

use blockrank_core::{Error, Result, ResultSet, SearchHit};

pub const DEFAULT_RRF_K: f64 = 60.0;

/// How several ranked sources become one.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeStrategy {
    /// `score = Σ 1 / (k + rank)` over every source containing the doc.
    Rrf { k: f64 },
    /// `score = Σ weight[s] * score_s`; sources without a weight count 1.0.
    /// Scores are used raw, without cross-source normalization.
    Weighted { weights: BTreeMap<usize, f64> },
    /// Sources appended in order, first occurrence of a doc wins.
    Concatenate,
    /// Round robin over sources, one unseen hit per source per pass.
    Interleave,
}

impl MergeStrategy {
    pub const TAGS: [&'static str; 4] = ["rrf", "weighted", "concatenate", "interleave"];

    /// Strategy for `tag` with default parameters.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "rrf" => Ok(Self::Rrf { k: DEFAULT_RRF_K }),
            "weighted" => Ok(Self::Weighted { weights: BTreeMap::new() }),
            "concatenate" => Ok(Self::Concatenate),
            "interleave" => Ok(Self::Interleave),
            other => Err(Error::Merge(format!(
                "unknown merge strategy '{other}', expected one of {}",
                Self::TAGS.join(", ")
            ))),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Rrf { .. } => "rrf",
            Self::Weighted { .. } => "weighted",
            Self::Concatenate => "concatenate",
            Self::Interleave => "interleave",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    pub strategy: MergeStrategy,
    /// Applied after the strategy; `None` keeps every hit.
    pub max_results: Option<usize>,
}

impl MergeSpec {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy, max_results: None }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Merge `sources` (in declaration order) into one result set.
///
/// Hits keep the `source_fields`, `source_index`, and `index` of their first
/// occurrence. Ties in fused score keep first-encounter order: sources in
/// declaration order, then rank ascending.
pub fn merge(sources: Vec<ResultSet>, spec: &MergeSpec) -> ResultSet {
    let mut merged = match &spec.strategy {
        MergeStrategy::Rrf { k } => fuse_scores(sources, |_, hit| 1.0 / (k + hit.rank as f64)),
        MergeStrategy::Weighted { weights } => {
            fuse_scores(sources, |source, hit| weights.get(&source).copied().unwrap_or(1.0) * hit.score)
        }
        MergeStrategy::Concatenate => concatenate(sources),
        MergeStrategy::Interleave => interleave(sources, spec.max_results),
    };
    if let Some(max) = spec.max_results {
        merged.truncate(max);
    }
    merged
}

fn fuse_scores<F>(sources: Vec<ResultSet>, contribution: F) -> ResultSet
where
    F: Fn(usize, &SearchHit) -> f64,
{
    let mut fused: Vec<SearchHit> = Vec::new();
    let mut totals: Vec<f64> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (source, set) in sources.into_iter().enumerate() {
        for hit in set.into_hits() {
            let part = contribution(source, &hit);
            match slots.get(&hit.doc_id) {
                Some(&slot) => totals[slot] += part,
                None => {
                    slots.insert(hit.doc_id.clone(), fused.len());
                    totals.push(part);
                    fused.push(hit);
                }
            }
        }
    }
    for (hit, total) in fused.iter_mut().zip(totals) {
        hit.score = total;
    }
    ResultSet::from_scored(fused)
}

fn concatenate(sources: Vec<ResultSet>) -> ResultSet {
    ResultSet::from_ranked(sources.into_iter().flat_map(ResultSet::into_hits).collect())
}

fn interleave(sources: Vec<ResultSet>, max_results: Option<usize>) -> ResultSet {
    let limit = max_results.unwrap_or(usize::MAX);
    let mut cursors: Vec<_> = sources.into_iter().map(|s| s.into_hits().into_iter()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    let mut progressed = true;
    while progressed && out.len() < limit {
        progressed = false;
        for cursor in &mut cursors {
            if out.len() >= limit {
                break;
            }
            if let Some(hit) = cursor.find(|h| !seen.contains(&h.doc_id)) {
                seen.insert(hit.doc_id.clone());
                out.push(hit);
                progressed = true;
            }
        }
    }
    ResultSet::from_ranked(out)
}

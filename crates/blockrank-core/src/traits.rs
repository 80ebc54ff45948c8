use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::algorithm::AlgorithmConfig;
use crate::error::{Error, Result};
use crate::types::BackendHit;

/// A searchable field with its query-time boost, written `name` or `name^boost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedField {
    pub name: String,
    pub boost: f64,
}

impl WeightedField {
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, boost) = match spec.split_once('^') {
            None => (spec, 1.0),
            Some((name, raw)) => {
                let boost: f64 = raw.trim().parse().map_err(|_| {
                    Error::ConfigValidation(format!("field '{spec}' has a non-numeric boost '{raw}'"))
                })?;
                if !boost.is_finite() || boost <= 0.0 {
                    return Err(Error::ConfigValidation(format!(
                        "field '{spec}' must have a positive boost, got {boost}"
                    )));
                }
                (name, boost)
            }
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::ConfigValidation(format!("field '{spec}' has an empty name")));
        }
        Ok(Self { name: name.to_string(), boost })
    }
}

/// One keyword query. Everything except `fields`, `boost`, and `size` is passed
/// through from the algorithm description without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordQuery {
    pub index: Option<String>,
    pub fields: Vec<WeightedField>,
    pub operator: String,
    pub minimum_should_match: Option<Value>,
    pub fuzziness: Option<Value>,
    pub boost: f64,
    pub size: usize,
    pub query_text: String,
    pub filters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorQuery {
    pub index: Option<String>,
    pub field: String,
    pub k: usize,
    pub num_candidates: usize,
    pub similarity: Option<String>,
    pub boost: f64,
    pub query_vector: Vec<f32>,
    pub filters: Option<Map<String, Value>>,
}

/// The search backend as seen by generation blocks.
///
/// Implementations must scale returned scores by the query's `boost`
/// (see [`apply_boost`]) and return hits best-first.
pub trait BackendAdapter: Send + Sync {
    fn search_keyword<'a>(&'a self, query: &'a KeywordQuery) -> BoxFuture<'a, Result<Vec<BackendHit>>>;
    fn search_vector<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<BackendHit>>>;
}

/// Scales every score by `boost`. A boost of exactly 1.0 leaves scores untouched.
pub fn apply_boost(hits: &mut [BackendHit], boost: f64) {
    if boost != 1.0 {
        for hit in hits {
            hit.score *= boost;
        }
    }
}

/// Exact-match request filters over a document's source fields. Every filter
/// key must match: equal values, membership when the source field is an
/// array, or any-of when the filter value is an array.
pub fn matches_filters(source: &Map<String, Value>, filters: &Map<String, Value>) -> bool {
    filters.iter().all(|(key, wanted)| match (source.get(key), wanted) {
        (None, _) => false,
        (Some(Value::Array(have)), Value::Array(any)) => have.iter().any(|v| any.contains(v)),
        (Some(Value::Array(have)), wanted) => have.contains(wanted),
        (Some(have), Value::Array(any)) => any.contains(have),
        (Some(have), wanted) => have == wanted,
    })
}

/// Storage of algorithm descriptions, consumed by the pipeline's caller.
pub trait AlgorithmStore: Send + Sync {
    fn load(&self, algorithm_id: &str) -> Result<AlgorithmConfig>;
    fn list(&self) -> Result<Vec<AlgorithmConfig>>;
    fn save(&self, algorithm: &AlgorithmConfig) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_field_parsing() {
        assert_eq!(WeightedField::parse("title").expect("plain").boost, 1.0);
        let f = WeightedField::parse("title^3").expect("boosted");
        assert_eq!((f.name.as_str(), f.boost), ("title", 3.0));
        assert_eq!(WeightedField::parse("tags^0.5").expect("fractional").boost, 0.5);
        for bad in ["title^x", "title^", "^2", "title^-1", "title^0"] {
            let err = WeightedField::parse(bad).expect_err(bad);
            assert_eq!(err.kind(), crate::ErrorKind::ConfigValidationError, "{bad}");
        }
    }

    #[test]
    fn boost_scales_scores() {
        let mut hits = vec![BackendHit::new("a", 2.0), BackendHit::new("b", 1.0)];
        apply_boost(&mut hits, 1.5);
        assert_eq!(hits[0].score, 3.0);
        assert_eq!(hits[1].score, 1.5);
    }

    #[test]
    fn filters_match_exactly() {
        let source = serde_json::json!({"brand": "acme", "tags": ["boots", "winter"], "price": 20});
        let source = source.as_object().expect("object");
        let filters = |v: serde_json::Value| v.as_object().expect("object").clone();

        assert!(matches_filters(source, &filters(serde_json::json!({"brand": "acme"}))));
        assert!(matches_filters(source, &filters(serde_json::json!({"tags": "winter", "price": 20}))));
        assert!(matches_filters(source, &filters(serde_json::json!({"brand": ["other", "acme"]}))));
        assert!(!matches_filters(source, &filters(serde_json::json!({"brand": "Acme"}))));
        assert!(!matches_filters(source, &filters(serde_json::json!({"color": "red"}))));
        assert!(matches_filters(source, &Map::new()));
    }
}

use blockrank_core::{ResultSet, SearchHit};
use serde_json::Value;

/// Multiplicative boost by a numeric source field:
/// `new_score = score * (1 + weight * field_value)`.
///
/// A missing or non-numeric field counts as 0, leaving that hit's score
/// unchanged. Without a field the rerank passes results through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBoost {
    pub field: Option<String>,
    pub weight: f64,
}

impl Default for FieldBoost {
    fn default() -> Self {
        Self { field: None, weight: 1.0 }
    }
}

impl FieldBoost {
    pub fn new(field: impl Into<String>, weight: f64) -> Self {
        Self { field: Some(field.into()), weight }
    }

    pub fn apply(&self, results: ResultSet) -> ResultSet {
        let Some(field) = self.field.as_deref() else {
            return results;
        };
        let mut hits = results.into_hits();
        for hit in &mut hits {
            hit.score *= 1.0 + self.weight * field_value(hit, field);
        }
        ResultSet::from_scored(hits)
    }
}

fn field_value(hit: &SearchHit, field: &str) -> f64 {
    match hit.source_fields.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockrank_core::BackendHit;

    #[test]
    fn strings_and_booleans_are_not_numeric() {
        let hits = vec![
            SearchHit::from_backend(BackendHit::new("s", 1.0).with_field("pop", "10"), 0),
            SearchHit::from_backend(BackendHit::new("b", 1.0).with_field("pop", true), 0),
        ];
        let out = FieldBoost::new("pop", 2.0).apply(ResultSet::from_ranked(hits));
        assert!(out.iter().all(|h| h.score == 1.0));
        assert_eq!(out.doc_ids(), vec!["s", "b"]);
    }
}

use blockrank_core::{Document, VectorQuery};
use blockrank_vector::{VectorRecord, VectorStore};
use serde_json::{json, Map, Value};

fn doc(id: &str, fields: Value) -> Document {
    Document { id: id.to_string(), fields: fields.as_object().cloned().unwrap_or_default() }
}

fn store() -> VectorStore {
    let docs = vec![
        doc("north", json!({"title": "north", "color": "red", "embedding_vector": [0.0, 1.0]})),
        doc("east", json!({"title": "east", "color": "blue", "embedding_vector": [1.0, 0.0]})),
        doc("north-east", json!({"title": "ne", "color": "red", "embedding_vector": [0.7, 0.7]})),
        doc("plain", json!({"title": "no vector"})),
    ];
    VectorStore::from_documents(&docs, &["embedding_vector".to_string()], false).unwrap()
}

fn query(vector: Vec<f32>, k: usize) -> VectorQuery {
    VectorQuery {
        index: Some("products".to_string()),
        field: "embedding_vector".to_string(),
        k,
        num_candidates: 10,
        similarity: None,
        boost: 1.0,
        query_vector: vector,
        filters: None,
    }
}

#[test]
fn nearest_neighbours_by_cosine() {
    let hits = store().search(&query(vec![0.0, 2.0], 2)).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["north", "north-east"]);
    assert_eq!(hits[0].score, 1.0);
    assert_eq!(hits[0].index.as_deref(), Some("products"));
    assert!(!hits[0].source_fields.contains_key("embedding_vector"));
    assert_eq!(hits[0].source_fields["color"], "red");
}

#[test]
fn l2_norm_and_boost() {
    let mut q = query(vec![1.0, 0.0], 1);
    q.similarity = Some("l2_norm".to_string());
    q.boost = 3.0;
    let hits = store().search(&q).unwrap();
    assert_eq!(hits[0].doc_id, "east");
    assert_eq!(hits[0].score, 3.0);
}

#[test]
fn filters_apply_before_ranking() {
    let mut q = query(vec![1.0, 0.0], 1);
    let mut filters = Map::new();
    filters.insert("color".to_string(), json!("red"));
    q.filters = Some(filters);
    let hits = store().search(&q).unwrap();
    assert_eq!(hits[0].doc_id, "north-east");
}

#[test]
fn dimension_mismatches_are_errors() {
    let mut s = store();
    assert!(s.search(&query(vec![1.0, 0.0, 0.0], 1)).is_err());

    let wide = VectorRecord {
        id: "wide".to_string(),
        vectors: [("embedding_vector".to_string(), vec![1.0, 2.0, 3.0])].into_iter().collect(),
        source: Map::new(),
    };
    assert!(s.insert(wide).is_err());
    assert_eq!(s.len(), 4);
}

#[test]
fn unknown_field_and_similarity_are_errors() {
    let mut q = query(vec![1.0, 0.0], 1);
    q.similarity = Some("hamming".to_string());
    assert!(store().search(&q).is_err());

    let mut q = query(vec![1.0, 0.0], 1);
    q.field = "image_vector".to_string();
    assert!(store().search(&q).is_err());
}

#[test]
fn non_numeric_vectors_are_rejected() {
    let docs = vec![doc("bad", json!({"embedding_vector": [0.1, "x"]}))];
    assert!(VectorStore::from_documents(&docs, &["embedding_vector".to_string()], false).is_err());
}

#[test]
fn persists_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let original = store();
    original.save(dir.path()).unwrap();
    let loaded = VectorStore::load(dir.path()).unwrap();
    assert_eq!(loaded, original);
    assert!(VectorStore::load(&dir.path().join("missing")).is_err());
}

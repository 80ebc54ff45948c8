use std::sync::Arc;

use blockrank_core::{AlgorithmConfig, BackendAdapter, BlockConfig, Document, Error, ExecutionContext, KeywordQuery, WeightedField};
use blockrank_hybrid::{Collection, HybridBackend};
use blockrank_pipeline::{compile, Executor};
use serde_json::{json, Value};

fn doc(id: &str, fields: Value) -> Document {
    Document { id: id.to_string(), fields: fields.as_object().cloned().unwrap_or_default() }
}

fn catalog() -> Vec<Document> {
    vec![
        doc("boots", json!({"title": "Winter boots", "popularity_score": 2, "embedding_vector": [1.0, 0.0]})),
        doc("jacket", json!({"title": "Winter jacket", "popularity_score": 10, "embedding_vector": [0.8, 0.6]})),
        doc("sandals", json!({"title": "Summer sandals", "popularity_score": 1, "embedding_vector": [0.0, 1.0]})),
    ]
}

fn text_fields() -> Vec<String> {
    vec!["title".to_string()]
}

fn keyword_query(index: Option<&str>) -> KeywordQuery {
    KeywordQuery {
        index: index.map(str::to_string),
        fields: vec![WeightedField::parse("title").unwrap()],
        operator: "or".to_string(),
        minimum_should_match: None,
        fuzziness: None,
        boost: 1.0,
        size: 10,
        query_text: "winter".to_string(),
        filters: None,
    }
}

#[tokio::test]
async fn builds_reopens_and_serves_collections() {
    let root = tempfile::tempdir().unwrap();
    Collection::build(&root.path().join("products"), &catalog(), &text_fields(), "embedding_vector", false).unwrap();

    let backend = HybridBackend::open(root.path(), "products").unwrap();
    assert_eq!(backend.collection_names(), vec!["products"]);

    let hits = backend.search_keyword(&keyword_query(None)).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.doc_id != "sandals"));

    let err = backend.search_keyword(&keyword_query(Some("archive"))).await.unwrap_err();
    assert!(matches!(err, Error::BackendCall(_)), "{err}");
}

#[tokio::test]
async fn search_failures_become_backend_call_errors() {
    let root = tempfile::tempdir().unwrap();
    let collection =
        Collection::build(&root.path().join("products"), &catalog(), &text_fields(), "embedding_vector", false).unwrap();
    let backend = HybridBackend::new("products").with_collection("products", collection);

    let mut query = keyword_query(None);
    query.fields = vec![WeightedField::parse("sku").unwrap()];
    assert!(matches!(backend.search_keyword(&query).await, Err(Error::BackendCall(_))));
}

#[tokio::test]
async fn hybrid_algorithm_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let collection =
        Collection::build(&root.path().join("products"), &catalog(), &text_fields(), "embedding_vector", false).unwrap();
    let backend: Arc<dyn BackendAdapter> = Arc::new(HybridBackend::new("products").with_collection("products", collection));

    let algorithm = compile(&AlgorithmConfig::new(
        "hybrid",
        "Hybrid",
        vec![
            BlockConfig::new("keyword_search", json!({"fields": ["title"]})).named("bm25"),
            BlockConfig::new("vector_search", json!({"field": "embedding_vector", "k": 3, "num_candidates": 3})).named("knn"),
            BlockConfig::new("merge", json!({"strategy": "rrf"})),
            BlockConfig::new("rerank", json!({"boost_by_field": "popularity_score", "weight": 0.3})),
        ],
    ))
    .unwrap();
    let ctx = ExecutionContext::new("winter").with_vector(vec![1.0, 0.0]);

    let output = Executor::new(backend).execute(&algorithm, &ctx).await.unwrap();
    assert_eq!(output.results.len(), 3);
    // the popular jacket overtakes the boots once the rerank applies
    assert_eq!(output.results.hits()[0].doc_id, "jacket");
    assert_eq!(output.results.get("sandals").unwrap().rank, 3);
}

use blockrank_core::{Document, KeywordQuery, WeightedField};
use blockrank_text::{KeywordIndex, KeywordIndexer};
use serde_json::{json, Map, Value};

fn doc(id: &str, fields: Value) -> Document {
    Document { id: id.to_string(), fields: fields.as_object().cloned().unwrap_or_default() }
}

fn catalog() -> Vec<Document> {
    vec![
        doc("1", json!({"title": "Leather winter boots", "description": "Warm boots for snow", "brand": "north"})),
        doc("2", json!({"title": "Running shoes", "description": "Light shoes for road running", "brand": "fleet"})),
        doc("3", json!({"title": "Rain jacket", "description": "Packable jacket, keeps you dry in winter rain", "brand": "north"})),
        doc("4", json!({"title": "Hiking boots", "description": "Ankle support on rough trails", "tags": ["boots", "outdoor"], "brand": "fleet"})),
    ]
}

fn fields() -> Vec<String> {
    vec!["title".to_string(), "description".to_string(), "tags".to_string()]
}

fn query(text: &str, fields: &[&str]) -> KeywordQuery {
    KeywordQuery {
        index: None,
        fields: fields.iter().map(|f| WeightedField::parse(f).unwrap()).collect(),
        operator: "or".to_string(),
        minimum_should_match: None,
        fuzziness: None,
        boost: 1.0,
        size: 10,
        query_text: text.to_string(),
        filters: None,
    }
}

fn in_ram() -> KeywordIndex {
    let indexer = KeywordIndexer::create_in_ram(&fields()).unwrap();
    assert_eq!(indexer.index_documents(&catalog()).unwrap(), 4);
    indexer.into_search_index().unwrap()
}

fn ids(hits: &[blockrank_core::BackendHit]) -> Vec<&str> {
    hits.iter().map(|h| h.doc_id.as_str()).collect()
}

#[test]
fn matches_any_field_and_returns_sources() {
    let index = in_ram();
    let hits = index.search(&query("boots", &["title", "description", "tags"])).unwrap();
    let mut found = ids(&hits);
    found.sort();
    assert_eq!(found, vec!["1", "4"]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    let first = &hits[0];
    assert!(first.source_fields.contains_key("title"));
}

#[test]
fn and_operator_requires_every_term() {
    let index = in_ram();
    let mut q = query("winter boots", &["title", "description"]);
    let or_hits = index.search(&q).unwrap();
    assert_eq!(or_hits.len(), 3);

    q.operator = "and".to_string();
    assert_eq!(ids(&index.search(&q).unwrap()), vec!["1"]);
}

#[test]
fn minimum_should_match_limits_partial_matches() {
    let index = in_ram();
    let mut q = query("winter boots", &["title", "description"]);
    q.minimum_should_match = Some(json!("100%"));
    assert_eq!(ids(&index.search(&q).unwrap()), vec!["1"]);
}

#[test]
fn fuzziness_tolerates_typos() {
    let index = in_ram();
    let mut q = query("jaket", &["title"]);
    assert!(index.search(&q).unwrap().is_empty());
    q.fuzziness = Some(json!("AUTO"));
    assert_eq!(ids(&index.search(&q).unwrap()), vec!["3"]);

    let mut far = query("jackxx", &["title"]);
    far.fuzziness = Some(json!("AUTO"));
    assert!(index.search(&far).unwrap().is_empty());
    far.fuzziness = Some(json!(5));
    assert_eq!(ids(&index.search(&far).unwrap()), vec!["3"]);
}

#[test]
fn boost_scales_scores_and_size_caps_results() {
    let index = in_ram();
    let plain = index.search(&query("boots", &["title"])).unwrap();

    let mut boosted_query = query("boots", &["title"]);
    boosted_query.boost = 2.0;
    boosted_query.size = 1;
    let boosted = index.search(&boosted_query).unwrap();
    assert_eq!(boosted.len(), 1);
    assert_eq!(boosted[0].doc_id, plain[0].doc_id);
    assert!((boosted[0].score - 2.0 * plain[0].score).abs() < 1e-9);
}

#[test]
fn filters_are_exact_matches_on_source_fields() {
    let index = in_ram();
    let mut q = query("winter boots", &["title", "description"]);
    let mut filters = Map::new();
    filters.insert("brand".to_string(), json!("north"));
    q.filters = Some(filters);
    let hits = index.search(&q).unwrap();
    let mut found = ids(&hits);
    found.sort();
    assert_eq!(found, vec!["1", "3"]);
}

#[test]
fn stop_word_only_queries_return_nothing() {
    let index = in_ram();
    assert!(index.search(&query("the of and", &["title"])).unwrap().is_empty());
}

#[test]
fn unknown_fields_are_an_error() {
    let index = in_ram();
    assert!(index.search(&query("boots", &["sku"])).is_err());
}

#[test]
fn on_disk_index_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products");
    let indexer = KeywordIndexer::create(&path, &fields()).unwrap();
    indexer.index_documents(&catalog()).unwrap();
    drop(indexer);

    let index = KeywordIndex::open(&path).unwrap();
    assert_eq!(index.num_docs(), 4);
    assert_eq!(ids(&index.search(&query("jacket", &["title"])).unwrap()), vec!["3"]);
}

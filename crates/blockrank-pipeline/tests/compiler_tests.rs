use blockrank_core::{AlgorithmConfig, BlockConfig, Error, FailurePolicy};
use blockrank_fusion::MergeStrategy;
use blockrank_pipeline::{compile, compile_json, FinalOutput, GenerationBlock, RerankInput, Stage};
use serde_json::json;

fn keyword(name: &str) -> BlockConfig {
    BlockConfig::new("keyword_search", json!({"fields": ["title^2", "description"]})).named(name)
}

fn vector(name: &str) -> BlockConfig {
    BlockConfig::new("vector_search", json!({"field": "embedding_vector", "k": 10, "num_candidates": 50})).named(name)
}

fn merge(strategy: &str) -> BlockConfig {
    BlockConfig::new("merge", json!({ "strategy": strategy }))
}

fn rerank() -> BlockConfig {
    BlockConfig::new("rerank", json!({"boost_by_field": "popularity_score", "weight": 0.3}))
}

fn algorithm(components: Vec<BlockConfig>) -> AlgorithmConfig {
    AlgorithmConfig::new("test-algo", "Test algorithm", components)
}

#[test]
fn hybrid_rrf_description_compiles_to_three_stages() {
    let compiled = compile_json(
        r#"{
            "algorithm_id": "hybrid_rrf_v1",
            "version": "2.1",
            "name": "Hybrid RRF",
            "failure_policy": "degrade",
            "metadata": {"owner": "search"},
            "components": [
                {"type": "keyword_search", "name": "bm25", "config": {"fields": ["title^3", "tags"], "size": 20}},
                {"type": "vector_search", "name": "knn", "config": {"field": "embedding_vector", "k": 20, "num_candidates": 100}},
                {"type": "merge", "config": {"strategy": "rrf", "k": 60, "max_results": 10}},
                {"type": "rerank", "config": {"boost_by_field": "popularity_score", "weight": 0.3}}
            ]
        }"#,
    )
    .unwrap();

    assert_eq!(compiled.id, "hybrid_rrf_v1");
    assert_eq!(compiled.version, "2.1");
    assert_eq!(compiled.failure_policy, Some(FailurePolicy::Degrade));
    assert_eq!(compiled.metadata["owner"], "search");
    assert_eq!(compiled.plan.stages.len(), 3);
    assert_eq!(compiled.plan.output, FinalOutput::Carry);

    let Stage::Generate(blocks) = &compiled.plan.stages[0] else {
        panic!("first stage should generate");
    };
    let sources: Vec<usize> = blocks.iter().map(GenerationBlock::source_index).collect();
    assert_eq!(sources, vec![0, 1]);

    match &compiled.plan.stages[1] {
        Stage::Merge { block, include_carry } => {
            assert!(!include_carry);
            assert_eq!(block.spec.strategy, MergeStrategy::Rrf { k: 60.0 });
            assert_eq!(block.spec.max_results, Some(10));
        }
        other => panic!("expected merge, got {other:?}"),
    }
    assert!(matches!(&compiled.plan.stages[2], Stage::Rerank { input: RerankInput::Carry, .. }));
}

#[test]
fn vector_search_without_k_fails_at_compile_time() {
    let err = compile(&algorithm(vec![BlockConfig::new(
        "vector_search",
        json!({"field": "embedding_vector", "num_candidates": 50}),
    )]))
    .unwrap_err();
    assert!(matches!(err, Error::ConfigValidation(_)), "{err}");
    assert!(err.is_compile_time());
}

#[test]
fn vector_search_range_checks() {
    for config in [
        json!({"field": "v", "k": 0, "num_candidates": 10}),
        json!({"field": "v", "k": 10, "num_candidates": 5}),
        json!({"field": "v", "k": 2.5, "num_candidates": 10}),
        json!({"field": "", "k": 1, "num_candidates": 1}),
        json!({"k": 1, "num_candidates": 1}),
    ] {
        let err = compile(&algorithm(vec![BlockConfig::new("vector_search", config.clone())])).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)), "{config}: {err}");
    }
}

#[test]
fn unknown_merge_strategy_is_a_merge_error() {
    let err = compile(&algorithm(vec![keyword("a"), keyword("b"), merge("borda")])).unwrap_err();
    assert!(matches!(err, Error::Merge(_)), "{err}");

    let missing = compile(&algorithm(vec![keyword("a"), BlockConfig::new("merge", json!({}))])).unwrap_err();
    assert!(matches!(missing, Error::ConfigValidation(_)), "{missing}");
}

#[test]
fn unknown_block_type_is_rejected() {
    let err = compile(&algorithm(vec![BlockConfig::new("hybrid_search", json!({}))])).unwrap_err();
    assert!(matches!(err, Error::ConfigValidation(_)), "{err}");
}

#[test]
fn merge_without_inputs_is_an_order_error() {
    let err = compile(&algorithm(vec![merge("rrf"), keyword("late")])).unwrap_err();
    assert!(matches!(err, Error::PipelineOrder(_)), "{err}");
}

#[test]
fn rerank_over_unmerged_sources_is_an_order_error() {
    let err = compile(&algorithm(vec![keyword("a"), vector("b"), rerank()])).unwrap_err();
    assert!(matches!(err, Error::PipelineOrder(_)), "{err}");

    let err = compile(&algorithm(vec![rerank()])).unwrap_err();
    assert!(matches!(err, Error::PipelineOrder(_)), "{err}");
}

#[test]
fn rerank_directly_on_a_single_search() {
    let compiled = compile(&algorithm(vec![keyword("only"), rerank()])).unwrap();
    assert!(matches!(&compiled.plan.stages[1], Stage::Rerank { input: RerankInput::Pending, .. }));
    assert_eq!(compiled.plan.output, FinalOutput::Carry);
}

#[test]
fn disabled_blocks_are_dropped_before_planning() {
    let compiled = compile(&algorithm(vec![
        keyword("a"),
        vector("off").disabled(),
        merge("rrf").disabled(),
    ]))
    .unwrap();
    assert_eq!(compiled.plan.output, FinalOutput::SingleGeneration);
    assert_eq!(compiled.plan.generation_blocks().count(), 1);
    assert!(!compiled.plan.needs_query_vector());
}

#[test]
fn final_output_without_combination_stages() {
    assert_eq!(compile(&algorithm(vec![])).unwrap().plan.output, FinalOutput::Empty);
    assert_eq!(
        compile(&algorithm(vec![keyword("a"), vector("b")])).unwrap().plan.output,
        FinalOutput::ConcatenateFallback
    );
}

#[test]
fn second_merge_folds_in_the_previous_result() {
    let compiled = compile(&algorithm(vec![
        keyword("a"),
        vector("b"),
        merge("rrf"),
        keyword("c"),
        merge("concatenate"),
    ]))
    .unwrap();
    assert_eq!(compiled.plan.stages.len(), 4);
    assert!(matches!(&compiled.plan.stages[3], Stage::Merge { include_carry: true, .. }));
}

#[test]
fn searches_after_the_last_merge_are_pruned() {
    let compiled = compile(&algorithm(vec![keyword("a"), vector("b"), merge("rrf"), keyword("orphan")])).unwrap();
    assert_eq!(compiled.plan.stages.len(), 2);
    assert!(compiled.plan.generation_blocks().all(|b| b.label() != "orphan"));
}

#[test]
fn describe_lists_each_stage() {
    let compiled = compile(&algorithm(vec![keyword("bm25"), vector("knn"), merge("interleave")])).unwrap();
    let lines = compiled.plan.describe();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("bm25"));
    assert!(lines[1].contains("interleave"));
}

use blockrank_core::{AlgorithmConfig, Error, FailurePolicy, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::blocks::{Block, GenerationBlock};
use crate::plan::{ExecutionPlan, FinalOutput, RerankInput, Stage};
use crate::registry;

/// An algorithm that passed validation, ready to execute any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAlgorithm {
    pub id: String,
    pub version: String,
    pub name: String,
    pub metadata: Map<String, Value>,
    pub failure_policy: Option<FailurePolicy>,
    pub plan: ExecutionPlan,
}

pub fn compile_json(raw: &str) -> Result<CompiledAlgorithm> {
    compile(&AlgorithmConfig::from_json_str(raw)?)
}

/// Validate an algorithm description and lay it out as stages.
///
/// Never touches a backend: every configuration or ordering defect is
/// reported here, before the first request.
pub fn compile(algorithm: &AlgorithmConfig) -> Result<CompiledAlgorithm> {
    if algorithm.algorithm_id.trim().is_empty() {
        return Err(Error::ConfigValidation("algorithm_id must not be empty".to_string()));
    }

    let mut blocks = Vec::with_capacity(algorithm.components.len());
    let mut next_source = 0;
    for (position, config) in algorithm.components.iter().enumerate() {
        if !config.enabled {
            debug!(algorithm = %algorithm.algorithm_id, block = config.label(), "skipping disabled block");
            continue;
        }
        let block = registry::build_block(config).map_err(|e| at_component(e, position))?;
        let block = match block {
            Block::KeywordSearch(mut b) => {
                b.source_index = next_source;
                next_source += 1;
                Block::KeywordSearch(b)
            }
            Block::VectorSearch(mut b) => {
                b.source_index = next_source;
                next_source += 1;
                Block::VectorSearch(b)
            }
            other => other,
        };
        blocks.push(block);
    }

    let plan = plan(&algorithm.algorithm_id, group_stages(blocks))?;
    debug!(algorithm = %algorithm.algorithm_id, stages = plan.stages.len(), "compiled algorithm");

    Ok(CompiledAlgorithm {
        id: algorithm.algorithm_id.clone(),
        version: algorithm.version.clone(),
        name: algorithm.name.clone(),
        metadata: algorithm.metadata.clone(),
        failure_policy: algorithm.failure_policy,
        plan,
    })
}

fn at_component(err: Error, position: usize) -> Error {
    let locate = |msg: String| format!("component {position}: {msg}");
    match err {
        Error::ConfigValidation(msg) => Error::ConfigValidation(locate(msg)),
        Error::Merge(msg) => Error::Merge(locate(msg)),
        Error::PipelineOrder(msg) => Error::PipelineOrder(locate(msg)),
        other => other,
    }
}

/// Consecutive generation blocks share a stage; each combination block is its own.
fn group_stages(blocks: Vec<Block>) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::new();
    for block in blocks {
        let generation = match block {
            Block::KeywordSearch(b) => GenerationBlock::Keyword(b),
            Block::VectorSearch(b) => GenerationBlock::Vector(b),
            Block::Merge(block) => {
                stages.push(Stage::Merge { block, include_carry: false });
                continue;
            }
            Block::Rerank(block) => {
                stages.push(Stage::Rerank { block, input: RerankInput::Pending });
                continue;
            }
        };
        match stages.last_mut() {
            Some(Stage::Generate(group)) => group.push(generation),
            _ => stages.push(Stage::Generate(vec![generation])),
        }
    }
    stages
}

/// Walk the stages tracking which outputs are pending and whether a carry
/// exists, fixing every combination stage's inputs and the final output.
fn plan(algorithm_id: &str, mut stages: Vec<Stage>) -> Result<ExecutionPlan> {
    let mut pending_stages: Vec<usize> = Vec::new();
    let mut pending_outputs = 0usize;
    let mut consumed = vec![false; stages.len()];
    let mut carry = false;

    for (i, stage) in stages.iter_mut().enumerate() {
        match stage {
            Stage::Generate(blocks) => {
                pending_stages.push(i);
                pending_outputs += blocks.len();
            }
            Stage::Merge { block, include_carry } => {
                if pending_outputs == 0 && !carry {
                    return Err(Error::PipelineOrder(format!(
                        "merge block '{}' has no preceding search results to merge",
                        block.label
                    )));
                }
                *include_carry = carry;
                for stage in pending_stages.drain(..) {
                    consumed[stage] = true;
                }
                pending_outputs = 0;
                carry = true;
            }
            Stage::Rerank { block, input } => {
                if carry {
                    *input = RerankInput::Carry;
                } else if pending_outputs == 1 {
                    *input = RerankInput::Pending;
                    for stage in pending_stages.drain(..) {
                        consumed[stage] = true;
                    }
                    pending_outputs = 0;
                } else if pending_outputs == 0 {
                    return Err(Error::PipelineOrder(format!(
                        "rerank block '{}' has no preceding results to rerank",
                        block.label
                    )));
                } else {
                    return Err(Error::PipelineOrder(format!(
                        "rerank block '{}' needs a single ranked list but {pending_outputs} search results are \
                         pending; add a merge block before it",
                        block.label
                    )));
                }
                carry = true;
            }
        }
    }

    let output = if carry {
        FinalOutput::Carry
    } else {
        match pending_outputs {
            0 => FinalOutput::Empty,
            1 => FinalOutput::SingleGeneration,
            _ => FinalOutput::ConcatenateFallback,
        }
    };

    if carry {
        let mut index = 0;
        stages.retain(|stage| {
            let keep = consumed[index] || !matches!(stage, Stage::Generate(_));
            if let (false, Stage::Generate(blocks)) = (keep, stage) {
                for block in blocks {
                    warn!(
                        algorithm = algorithm_id,
                        block = block.label(),
                        "search block output never reaches the final result; dropping it"
                    );
                }
            }
            index += 1;
            keep
        });
    }

    Ok(ExecutionPlan { stages, output })
}

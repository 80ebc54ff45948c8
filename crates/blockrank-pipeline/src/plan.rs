use crate::blocks::{GenerationBlock, MergeBlock, RerankBlock};

/// One step of a compiled pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// A maximal run of consecutive generation blocks, executed concurrently.
    Generate(Vec<GenerationBlock>),
    /// Consumes every pending generation output, preceded by the carry when
    /// `include_carry` is set.
    Merge { block: MergeBlock, include_carry: bool },
    Rerank { block: RerankBlock, input: RerankInput },
}

/// Where a rerank takes its single input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankInput {
    /// The previous combination stage's output.
    Carry,
    /// The only pending generation output.
    Pending,
}

/// How the final result is produced once every stage has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalOutput {
    /// No generation blocks at all.
    Empty,
    /// The output of the last combination stage.
    Carry,
    /// The output of the only generation block.
    SingleGeneration,
    /// No combination stage and several generation blocks: concatenated with dedup.
    ConcatenateFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
    pub output: FinalOutput,
}

impl ExecutionPlan {
    pub fn generation_blocks(&self) -> impl Iterator<Item = &GenerationBlock> {
        self.stages
            .iter()
            .filter_map(|stage| match stage {
                Stage::Generate(blocks) => Some(blocks.iter()),
                _ => None,
            })
            .flatten()
    }

    pub fn needs_query_vector(&self) -> bool {
        self.generation_blocks().any(GenerationBlock::needs_query_vector)
    }

    /// Human readable stage listing, one line per stage.
    pub fn describe(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| match stage {
                Stage::Generate(blocks) => {
                    let names: Vec<String> = blocks
                        .iter()
                        .map(|b| format!("{} ({}, source {})", b.label(), b.type_tag(), b.source_index()))
                        .collect();
                    format!("stage {}: generate [{}]", i + 1, names.join(", "))
                }
                Stage::Merge { block, include_carry } => format!(
                    "stage {}: merge '{}' strategy={}{}",
                    i + 1,
                    block.label,
                    block.spec.strategy.tag(),
                    if *include_carry { " (with previous result)" } else { "" }
                ),
                Stage::Rerank { block, input } => format!(
                    "stage {}: rerank '{}' by {} on {}",
                    i + 1,
                    block.label,
                    block.boost.field.as_deref().unwrap_or("<none>"),
                    match input {
                        RerankInput::Carry => "previous result",
                        RerankInput::Pending => "generation output",
                    }
                ),
            })
            .collect();
        lines.push(format!("output: {:?}", self.output));
        lines
    }
}

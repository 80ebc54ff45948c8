use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use blockrank_core::{
    BackendAdapter, DroppedSource, Error, ErrorReport, ExecutionContext, FailurePolicy, Result, ResultSet,
};
use blockrank_fusion::{merge, MergeSpec, MergeStrategy};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::blocks::GenerationBlock;
use crate::compiler::CompiledAlgorithm;
use crate::plan::{FinalOutput, RerankInput, Stage};

/// Wall time and output size of one block within an execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockTiming {
    pub block: String,
    pub block_type: String,
    pub took_ms: f64,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutput {
    pub algorithm_id: String,
    pub version: String,
    pub results: ResultSet,
    pub dropped_sources: Vec<DroppedSource>,
    pub block_timings: Vec<BlockTiming>,
    pub took_ms: f64,
}

impl ExecutionOutput {
    /// True when a failed source was replaced by an empty result set.
    pub fn is_degraded(&self) -> bool {
        !self.dropped_sources.is_empty()
    }
}

/// Outcome of one algorithm in a comparison run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonEntry {
    pub algorithm_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ExecutionOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Runs compiled algorithms against one backend.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn BackendAdapter>,
    default_policy: FailurePolicy,
}

#[derive(Default)]
struct Trace {
    dropped: Vec<DroppedSource>,
    timings: Vec<BlockTiming>,
}

impl Trace {
    fn record(&mut self, block: &str, block_type: &str, took: Duration, hits: usize) {
        self.timings.push(BlockTiming {
            block: block.to_string(),
            block_type: block_type.to_string(),
            took_ms: millis(took),
            hits,
        });
    }
}

impl Executor {
    pub fn new(backend: Arc<dyn BackendAdapter>) -> Self {
        Self { backend, default_policy: FailurePolicy::default() }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Request override first, then the algorithm's own policy, then ours.
    pub fn effective_policy(&self, algorithm: &CompiledAlgorithm, ctx: &ExecutionContext) -> FailurePolicy {
        ctx.overrides
            .failure_policy
            .or(algorithm.failure_policy)
            .unwrap_or(self.default_policy)
    }

    pub async fn execute(&self, algorithm: &CompiledAlgorithm, ctx: &ExecutionContext) -> Result<ExecutionOutput> {
        let span = info_span!("execute", algorithm = %algorithm.id, version = %algorithm.version);
        self.run_plan(algorithm, ctx).instrument(span).await
    }

    /// Run several algorithms concurrently on the same request. Each entry
    /// carries its own outcome; one failure does not affect the others.
    pub async fn compare(&self, algorithms: &[Arc<CompiledAlgorithm>], ctx: &ExecutionContext) -> Vec<ComparisonEntry> {
        join_all(algorithms.iter().map(|algorithm| async move {
            match self.execute(algorithm, ctx).await {
                Ok(output) => ComparisonEntry { algorithm_id: algorithm.id.clone(), output: Some(output), error: None },
                Err(err) => {
                    warn!(algorithm = %algorithm.id, error = %err, "comparison run failed");
                    ComparisonEntry { algorithm_id: algorithm.id.clone(), output: None, error: Some(err.report()) }
                }
            }
        }))
        .await
    }

    async fn run_plan(&self, algorithm: &CompiledAlgorithm, ctx: &ExecutionContext) -> Result<ExecutionOutput> {
        let started = Instant::now();
        let plan = &algorithm.plan;

        if ctx.query_vector.is_none() {
            if let Some(block) = plan.generation_blocks().find(|b| b.needs_query_vector()) {
                return Err(Error::MissingQueryVector { block: block.label().to_string() });
            }
        }

        let policy = self.effective_policy(algorithm, ctx);
        let mut trace = Trace::default();
        let mut pending: Vec<ResultSet> = Vec::new();
        let mut carry: Option<ResultSet> = None;

        for stage in &plan.stages {
            match stage {
                Stage::Generate(blocks) => {
                    let outputs = guarded(ctx, self.generate(blocks, ctx, policy, &mut trace)).await?;
                    pending.extend(outputs);
                }
                Stage::Merge { block, include_carry } => {
                    let block_started = Instant::now();
                    let mut inputs = Vec::with_capacity(pending.len() + 1);
                    if *include_carry {
                        inputs.extend(carry.take());
                    }
                    inputs.append(&mut pending);
                    let merged = block.combine(inputs);
                    debug!(block = %block.label, strategy = block.spec.strategy.tag(), hits = merged.len(), "merged");
                    trace.record(&block.label, "merge", block_started.elapsed(), merged.len());
                    carry = Some(merged);
                }
                Stage::Rerank { block, input } => {
                    let block_started = Instant::now();
                    let source = match input {
                        RerankInput::Carry => carry.take(),
                        RerankInput::Pending => pending.pop(),
                    };
                    let reranked = block.apply(source.unwrap_or_default());
                    debug!(block = %block.label, hits = reranked.len(), "reranked");
                    trace.record(&block.label, "rerank", block_started.elapsed(), reranked.len());
                    carry = Some(reranked);
                }
            }
        }

        let results = match plan.output {
            FinalOutput::Empty => ResultSet::empty(),
            FinalOutput::Carry => carry.unwrap_or_default(),
            FinalOutput::SingleGeneration => pending.pop().unwrap_or_default(),
            FinalOutput::ConcatenateFallback => merge(pending, &MergeSpec::new(MergeStrategy::Concatenate)),
        };

        let output = ExecutionOutput {
            algorithm_id: algorithm.id.clone(),
            version: algorithm.version.clone(),
            results,
            dropped_sources: trace.dropped,
            block_timings: trace.timings,
            took_ms: millis(started.elapsed()),
        };
        info!(
            hits = output.results.len(),
            degraded = output.is_degraded(),
            took_ms = output.took_ms,
            "execution finished"
        );
        Ok(output)
    }

    /// Issue every block of a generation stage at once and wait for all of them.
    async fn generate(
        &self,
        blocks: &[GenerationBlock],
        ctx: &ExecutionContext,
        policy: FailurePolicy,
        trace: &mut Trace,
    ) -> Result<Vec<ResultSet>> {
        let backend = self.backend.as_ref();

        match policy {
            FailurePolicy::FailFast => {
                let outputs = try_join_all(blocks.iter().map(|block| async move {
                    let (outcome, took) = timed_run(block, backend, ctx).await;
                    outcome.map(|set| (set, took))
                }))
                .await?;
                Ok(blocks
                    .iter()
                    .zip(outputs)
                    .map(|(block, (set, took))| {
                        debug!(block = block.label(), hits = set.len(), "search block finished");
                        trace.record(block.label(), block.type_tag(), took, set.len());
                        set
                    })
                    .collect())
            }
            FailurePolicy::Degrade => {
                let outcomes = join_all(blocks.iter().map(|block| timed_run(block, backend, ctx))).await;
                let mut sets = Vec::with_capacity(blocks.len());
                for (block, (outcome, took)) in blocks.iter().zip(outcomes) {
                    let set = match outcome {
                        Ok(set) => set,
                        Err(Error::BackendCall(reason)) => {
                            warn!(block = block.label(), %reason, "search block failed; continuing without it");
                            trace.dropped.push(DroppedSource {
                                source_index: block.source_index(),
                                block: block.label().to_string(),
                                reason,
                            });
                            ResultSet::empty()
                        }
                        Err(other) => return Err(other),
                    };
                    trace.record(block.label(), block.type_tag(), took, set.len());
                    sets.push(set);
                }
                Ok(sets)
            }
        }
    }
}

async fn timed_run(
    block: &GenerationBlock,
    backend: &dyn BackendAdapter,
    ctx: &ExecutionContext,
) -> (Result<ResultSet>, Duration) {
    let started = Instant::now();
    let outcome = block.run(backend, ctx).await;
    (outcome, started.elapsed())
}

/// Race `work` against the request's cancel signal and deadline. Losing the
/// race drops `work`, and with it every in-flight backend call.
async fn guarded<T>(ctx: &ExecutionContext, work: impl Future<Output = Result<T>>) -> Result<T> {
    let cancelled = async {
        match &ctx.cancel {
            Some(signal) => signal.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };
    let deadline = async {
        match ctx.deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => Err(Error::Cancelled("request was cancelled".to_string())),
        _ = deadline => Err(Error::Cancelled("request deadline elapsed".to_string())),
        outcome = work => outcome,
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

//! blockrank CLI
//!
//! Builds local collections and runs declarative ranking algorithms against them.

mod jsonl;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockrank_core::config::{Config, Settings};
use blockrank_core::store::FsAlgorithmStore;
use blockrank_core::{AlgorithmConfig, AlgorithmStore, BackendAdapter, Error, ExecutionContext, FailurePolicy};
use blockrank_hybrid::{Collection, HybridBackend};
use blockrank_pipeline::{compile, AlgorithmCache, CompiledAlgorithm, Executor};

#[derive(Parser)]
#[command(name = "blockrank")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative block pipelines for search ranking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the keyword index and vector store for a collection from JSONL
    Ingest {
        /// One JSON document per line
        file: PathBuf,
        /// Collection name (defaults to backend.default_index)
        #[arg(long)]
        index: Option<String>,
    },

    /// Compile an algorithm file and print its stages
    Validate {
        /// Algorithm description (JSON)
        file: PathBuf,
    },

    /// List stored algorithms
    Algorithms,

    /// Print one stored algorithm description
    Show {
        /// Stored algorithm id
        id: String,
    },

    /// Validate an algorithm file and add it to the store
    Save {
        /// Algorithm description (JSON)
        file: PathBuf,
    },

    /// Run one algorithm and print the ranked results
    Search {
        #[command(flatten)]
        source: AlgorithmSource,
        #[command(flatten)]
        request: RequestArgs,
        /// Replace failed searches with empty results instead of failing
        #[arg(long)]
        degrade: bool,
    },

    /// Run several stored algorithms on the same request
    Compare {
        /// Stored algorithm ids
        #[arg(long = "algorithm", required = true)]
        algorithms: Vec<String>,
        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct AlgorithmSource {
    /// Stored algorithm id
    #[arg(long)]
    algorithm: Option<String>,
    /// Algorithm description file (JSON)
    #[arg(long)]
    algorithm_file: Option<PathBuf>,
}

#[derive(Args)]
struct RequestArgs {
    /// Query text
    #[arg(long)]
    query: String,
    /// Query embedding as a JSON array of numbers
    #[arg(long)]
    vector_file: Option<PathBuf>,
    /// Collection to search (defaults to backend.default_index)
    #[arg(long)]
    index: Option<String>,
    /// Request deadline in milliseconds (defaults to pipeline.request_timeout_ms)
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Exact-match filters as a JSON object, e.g. '{"category": "Electronics"}'
    #[arg(long, value_parser = jsonl::parse_filters)]
    filters: Option<Map<String, Value>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            let report = match err.downcast_ref::<Error>() {
                Some(pipeline_err) => json!(pipeline_err.report()),
                None => json!({ "kind": "OperationError", "message": format!("{err:#}") }),
            };
            println!("{}", serde_json::to_string_pretty(&json!({ "error": report })).unwrap_or_default());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Config::load()?.settings()?;
    match cli.command {
        Commands::Ingest { file, index } => ingest(&settings, &file, index),
        Commands::Validate { file } => validate(&file),
        Commands::Algorithms => list_algorithms(&settings),
        Commands::Show { id } => show_algorithm(&settings, &id),
        Commands::Save { file } => save_algorithm(&settings, &file),
        Commands::Search { source, request, degrade } => search(&settings, source, request, degrade).await,
        Commands::Compare { algorithms, request } => compare(&settings, &algorithms, request).await,
    }
}

fn ingest(settings: &Settings, file: &Path, index: Option<String>) -> Result<ExitCode> {
    let name = index.unwrap_or_else(|| settings.backend.default_index.clone());
    let documents = jsonl::read_documents(file, &settings.backend.id_field)?;
    let dir = settings.index_dir().join(&name);
    info!(collection = %name, documents = documents.len(), dir = %dir.display(), "ingesting");
    Collection::build(&dir, &documents, &settings.backend.text_fields, &settings.backend.vector_field, true)?;
    print_json(&json!({ "index": name, "documents": documents.len(), "path": dir.display().to_string() }))
}

fn validate(file: &Path) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let compiled = compile(&AlgorithmConfig::from_json_str(&raw)?)?;
    print_json(&json!({
        "algorithm_id": compiled.id,
        "version": compiled.version,
        "stages": compiled.plan.describe(),
    }))
}

fn list_algorithms(settings: &Settings) -> Result<ExitCode> {
    let store = FsAlgorithmStore::new(settings.algorithms_dir());
    let listing: Vec<_> = store
        .list()?
        .into_iter()
        .map(|a| json!({ "algorithm_id": a.algorithm_id, "version": a.version, "name": a.name }))
        .collect();
    print_json(&json!(listing))
}

fn show_algorithm(settings: &Settings, id: &str) -> Result<ExitCode> {
    let algorithm = FsAlgorithmStore::new(settings.algorithms_dir()).load(id)?;
    print_json(&serde_json::to_value(&algorithm)?)
}

fn save_algorithm(settings: &Settings, file: &Path) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let store = FsAlgorithmStore::new(settings.algorithms_dir());
    let saved = store_algorithm(&store, &raw)?;
    info!(algorithm = %saved.algorithm_id, "algorithm saved");
    print_json(&json!({
        "algorithm_id": saved.algorithm_id,
        "version": saved.version,
        "path": store.root().join(format!("{}.json", saved.algorithm_id)).display().to_string(),
    }))
}

/// Compile before saving so the store only ever holds runnable algorithms.
fn store_algorithm(store: &dyn AlgorithmStore, raw: &str) -> blockrank_core::Result<AlgorithmConfig> {
    let algorithm = AlgorithmConfig::from_json_str(raw)?;
    compile(&algorithm)?;
    store.save(&algorithm)?;
    Ok(algorithm)
}

async fn search(settings: &Settings, source: AlgorithmSource, request: RequestArgs, degrade: bool) -> Result<ExitCode> {
    let algorithm = match (source.algorithm, source.algorithm_file) {
        (Some(id), _) => {
            let store = FsAlgorithmStore::new(settings.algorithms_dir());
            AlgorithmCache::new().get_or_compile(&store, &id)?
        }
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            Arc::new(compile(&AlgorithmConfig::from_json_str(&raw)?)?)
        }
        (None, None) => anyhow::bail!("either --algorithm or --algorithm-file is required"),
    };

    let mut ctx = request_context(settings, &request)?;
    if degrade {
        ctx = ctx.with_failure_policy(FailurePolicy::Degrade);
    }
    let output = executor(settings)?.execute(&algorithm, &ctx).await?;
    print_json(&json!({
        "algorithm_id": output.algorithm_id,
        "version": output.version,
        "total": output.results.len(),
        "hits": output.results.hits(),
        "degraded": output.is_degraded(),
        "dropped_sources": output.dropped_sources,
        "block_timings": output.block_timings,
        "took_ms": output.took_ms,
    }))
}

async fn compare(settings: &Settings, ids: &[String], request: RequestArgs) -> Result<ExitCode> {
    let store = FsAlgorithmStore::new(settings.algorithms_dir());
    let cache = AlgorithmCache::new();
    let algorithms = ids
        .iter()
        .map(|id| cache.get_or_compile(&store, id))
        .collect::<blockrank_core::Result<Vec<Arc<CompiledAlgorithm>>>>()?;

    let ctx = request_context(settings, &request)?;
    let entries = executor(settings)?.compare(&algorithms, &ctx).await;
    let failed = entries.iter().any(|e| e.error.is_some());
    print_json(&json!(entries))?;
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn request_context(settings: &Settings, request: &RequestArgs) -> Result<ExecutionContext> {
    let timeout = request.timeout_ms.unwrap_or(settings.pipeline.request_timeout_ms);
    let mut ctx = ExecutionContext::new(request.query.clone())
        .with_index(request.index.clone().unwrap_or_else(|| settings.backend.default_index.clone()));
    if timeout > 0 {
        ctx = ctx.with_timeout(Duration::from_millis(timeout));
    }
    if let Some(path) = &request.vector_file {
        ctx = ctx.with_vector(jsonl::read_vector(path)?);
    }
    if let Some(filters) = &request.filters {
        ctx = ctx.with_filters(filters.clone());
    }
    Ok(ctx)
}

fn executor(settings: &Settings) -> Result<Executor> {
    let backend: Arc<dyn BackendAdapter> =
        Arc::new(HybridBackend::open(&settings.index_dir(), settings.backend.default_index.clone())?);
    Ok(Executor::new(backend).with_failure_policy(settings.pipeline.failure_policy))
}

fn print_json(value: &serde_json::Value) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

//! RagQA - retrieval-augmented question answering with a local LLM.
//!
//! A CLI tool that answers question lists by refining each question,
//! searching the web for context and asking an Ollama model, with
//! per-question checkpoints so interrupted runs resume.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, inference unavailable, checkpoint failure, etc.)

mod agent;
mod batch;
mod cli;
mod config;
mod models;
mod pipeline;
mod retrieval;

use agent::{Inference, OllamaClient};
use anyhow::{Context, Result};
use batch::{
    continuation_index, load_questions, merge_checkpoints, write_merged, BatchRunner,
    FileCheckpointStore, LineFormat,
};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use models::{BatchSummary, Question};
use pipeline::{Answerer, Orchestrator};
use retrieval::{DuckDuckGoSearch, HttpFetcher, RetrievalEngine};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("RagQA v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .ragqa.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE_NAME);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let store = FileCheckpointStore::new(&config.batch.output_dir, &config.batch.prefix);

    if args.merge_only {
        let lines = merge(&store, config.batch.total_questions)?;
        println!("✅ Merged {} lines into {}", lines, store.merged_path().display());
        return Ok(());
    }

    let pipeline = build_pipeline(&config)?;

    if let Some(ref question) = args.ask {
        println!("🧪 Question: {}", question);
        let answer = pipeline.answer(question).await?;
        println!("\n{}", answer.text);
        println!("\n   Route: {}", answer.route);
        return Ok(());
    }

    println!("🤖 Model: {} @ {}", config.model.name, config.model.ollama_url);

    let mut summary = BatchSummary::start();
    let runner = BatchRunner::new(&pipeline, &store).with_progress(!args.quiet);

    let public = run_list(
        &runner,
        &config.batch.public_questions,
        1,
        LineFormat::FirstField,
        &mut summary,
    )
    .await?;

    let private_start = continuation_index(&public, config.batch.private_start_index);
    run_list(
        &runner,
        &config.batch.private_questions,
        private_start,
        LineFormat::Verbatim,
        &mut summary,
    )
    .await?;

    summary.merged_lines = merge(&store, config.batch.total_questions)?;
    summary.finish();

    print_summary(&summary, &store);

    if let Some(ref path) = args.summary {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    }

    Ok(())
}

/// Load one question list and answer it. A missing list is skipped.
async fn run_list(
    runner: &BatchRunner<'_, Orchestrator, FileCheckpointStore>,
    path: &Path,
    start_index: usize,
    format: LineFormat,
    summary: &mut BatchSummary,
) -> Result<Vec<Question>> {
    if !path.exists() {
        warn!("Question list not found, skipping: {}", path.display());
        return Ok(Vec::new());
    }

    let questions = load_questions(path, start_index, format)?;
    println!("📖 {} questions from {}", questions.len(), path.display());

    let part = runner.run(&questions).await?;
    summary.absorb(&part);
    Ok(questions)
}

/// Wire the shared model, search and fetch into an orchestrator.
fn build_pipeline(config: &Config) -> Result<Orchestrator> {
    let llm: Arc<dyn Inference> = Arc::new(OllamaClient::new(config.model.clone())?);
    let search = Arc::new(DuckDuckGoSearch::new(&config.search)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.search)?);
    let engine = RetrievalEngine::new(search, fetcher, config.retrieval.clone());

    Ok(Orchestrator::new(llm, engine, config.pipeline.fallback_input))
}

fn merge(store: &FileCheckpointStore, total: usize) -> Result<usize> {
    let lines = merge_checkpoints(store, total)?;
    write_merged(&store.merged_path(), &lines)?;
    info!("Merged {} lines into {}", lines.len(), store.merged_path().display());
    Ok(lines.len())
}

fn print_summary(summary: &BatchSummary, store: &FileCheckpointStore) {
    println!("\n📊 Run Summary:");
    println!("   Answered: {}", summary.processed);
    println!("   Skipped (checkpointed): {}", summary.skipped);
    println!("   Direct fallbacks: {}", summary.fallbacks);
    println!("   Duration: {:.1}s", summary.duration_seconds());
    println!(
        "\n✅ Done! {} lines written to: {}",
        summary.merged_lines,
        store.merged_path().display()
    );
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

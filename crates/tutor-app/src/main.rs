//! Tutor application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Select the embedding backend (hashing or ONNX model)
//! 3. Build the retrieval engine once (load -> chunk -> embed)
//! 4. Run the requested command against the shared engine

mod cli;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use tutor_core::config::{EmbeddingBackend, EmbeddingConfig, TutorConfig};
use tutor_core::error::TutorError;
use tutor_core::types::ContextResult;
use tutor_rag::embedding::{
    DynEmbeddingService, EmbeddingService, HashingEmbedding, OnnxEmbeddingService,
};
use tutor_rag::{EngineStats, RetrievalEngine};

use cli::{expand_home, CliArgs, Command};

const NO_INFORMATION: &str = "No information found in the documents.";
const UNAVAILABLE: &str = "Tutor service unavailable, try again.";

/// Load the config file if present, then apply CLI overrides.
fn load_config(args: &CliArgs) -> Result<TutorConfig, TutorError> {
    let mut config = TutorConfig::load_or_default(&args.resolve_config_path())?;
    args.apply_overrides(&mut config);
    config.corpus.directory = expand_home(&config.corpus.directory.to_string_lossy());
    Ok(config)
}

fn embedding_service(config: &EmbeddingConfig) -> Result<Box<dyn DynEmbeddingService>, TutorError> {
    match config.backend {
        EmbeddingBackend::Onnx => {
            let model_dir = expand_home(&config.model_dir);
            let service = OnnxEmbeddingService::from_directory(&model_dir)?;
            tracing::info!(
                model = %config.model_name,
                dimensions = EmbeddingService::dimensions(&service),
                "ONNX embedding backend ready"
            );
            Ok(Box::new(service))
        }
        EmbeddingBackend::Hashing => {
            tracing::info!(dimensions = config.dimensions, "Hashing embedding backend ready");
            Ok(Box::new(HashingEmbedding::new(config.dimensions)))
        }
    }
}

async fn build_engine(config: &TutorConfig) -> Result<Arc<RetrievalEngine>, TutorError> {
    config.validate()?;
    let embedder = embedding_service(&config.embedding)?;
    let engine = RetrievalEngine::from_config_dyn(config, embedder).await?;
    Ok(Arc::new(engine))
}

/// Run one search, giving up after `timeout`. A timeout is reported as an error.
async fn answer(
    engine: &RetrievalEngine,
    question: &str,
    timeout: Duration,
) -> Result<Option<ContextResult>, TutorError> {
    match tokio::time::timeout(timeout, engine.search(question)).await {
        Ok(result) => result,
        Err(_) => Err(TutorError::Search(format!(
            "query timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

fn print_context(context: Option<&ContextResult>) {
    let context = match context {
        Some(ctx) if !ctx.is_empty() => ctx,
        _ => {
            println!("{}", NO_INFORMATION);
            return;
        }
    };

    println!("{}", context.text);
    println!();
    println!("Sources:");
    for (rank, source) in context.sources.iter().enumerate() {
        println!(
            "  {}. {} #{} (score {:.3}){}",
            rank + 1,
            source.source_id,
            source.chunk_index,
            source.score,
            if source.truncated { " [truncated]" } else { "" }
        );
    }
}

fn print_stats(stats: &EngineStats) {
    println!("Documents loaded:  {}", stats.documents);
    println!("Passages indexed:  {}", stats.passages);
    match stats.dimensions {
        Some(d) => println!("Vector dimensions: {}", d),
        None => println!("Vector dimensions: -"),
    }
    if !stats.skipped_files.is_empty() {
        println!("Skipped files:");
        for skipped in &stats.skipped_files {
            println!("  {} ({})", skipped.source_id, skipped.reason);
        }
    }
    if !stats.failed_sources.is_empty() {
        println!("Failed to embed:");
        for (source_id, error) in &stats.failed_sources {
            println!("  {} ({})", source_id, error);
        }
    }
}

async fn run_repl(engine: Arc<RetrievalEngine>, timeout: Duration) -> Result<(), TutorError> {
    println!("Ask a question (empty line or Ctrl-D to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() || question == "exit" || question == "quit" {
            break;
        }

        match answer(&engine, question, timeout).await {
            Ok(context) => print_context(context.as_ref()),
            Err(e) => {
                tracing::error!(error = %e, "Search failed");
                println!("{}", UNAVAILABLE);
            }
        }
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = load_config(&args)?;

    // Tracing goes to stderr so stdout stays clean for --json output.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Tutor v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %args.resolve_config_path().display(),
        corpus = %config.corpus.directory.display(),
        "Configuration resolved"
    );

    if let Command::Config { save } = args.command {
        print!("{}", toml::to_string_pretty(&config)?);
        if save {
            config.save(&args.resolve_config_path())?;
        }
        return Ok(());
    }

    let engine = match build_engine(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build retrieval engine");
            return Err(e.into());
        }
    };
    let timeout = Duration::from_secs(config.general.query_timeout_secs);

    match args.command {
        Command::Ask { question, json } => {
            let question = question.join(" ");
            match answer(&engine, &question, timeout).await {
                Ok(context) if json => println!("{}", serde_json::to_string_pretty(&context)?),
                Ok(context) => print_context(context.as_ref()),
                Err(e) => {
                    tracing::error!(error = %e, "Search failed");
                    println!("{}", UNAVAILABLE);
                    return Err(e.into());
                }
            }
        }
        Command::Repl => run_repl(engine, timeout).await?,
        Command::Chunks { source } => {
            let passages = engine
                .passages()
                .iter()
                .filter(|p| source.as_ref().map_or(true, |s| &p.source_id == s));
            for passage in passages {
                let preview: String = passage.text.chars().take(60).collect();
                println!(
                    "{} #{} [{}, {}) {}",
                    passage.source_id,
                    passage.chunk_index,
                    passage.start_word,
                    passage.end_word,
                    preview
                );
            }
        }
        Command::Stats { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(engine.stats())?);
            } else {
                print_stats(engine.stats());
            }
        }
        Command::Config { .. } => {}
    }

    Ok(())
}

//! CLI entry point: load configuration, wire the service clients, run the
//! analysis pipeline over a project directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use regex::Regex;
use tracing_subscriber::EnvFilter;

use qualpipe::config::{self, AppConfig};
use qualpipe::pipeline::{AnalysisPipeline, PipelineError};
use qualpipe::service::embedding::{
    HttpEmbeddingClient, InMemoryVectorIndex, VectorCapability,
};
use qualpipe::service::gate::RequestGate;
use qualpipe::service::reasoning::{DryRunReasoning, HttpReasoningClient, ReasoningService};
use qualpipe::text::PlainTextSource;

#[derive(Parser, Debug)]
#[command(name = "qualpipe", version, about = "Qualitative research analysis pipeline")]
struct Cli {
    /// Project directory containing transcripts and the discussion guide
    project_directory: PathBuf,

    /// Path to a custom config file (default: ./config.yaml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without external API calls; responses are synthetic placeholders
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Skip writing report artifacts
    #[arg(long)]
    no_export: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut app_config = match AppConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // CLI overrides
    if cli.dry_run {
        app_config.runtime.execute_api_calls = false;
    }
    if cli.debug {
        app_config.runtime.debug_logging = true;
    }
    if cli.no_export {
        app_config.export.enabled = false;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config::default_log_filter(app_config.runtime.debug_logging))
        }))
        .init();

    tracing::info!(version = config::APP_VERSION, "Starting qualpipe");

    match run(&cli, app_config).await {
        Ok(()) => {
            println!("Analysis completed successfully.");
        }
        Err(e) => {
            tracing::error!(error = %e, "Pipeline failed");
            eprintln!("Pipeline failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli, app_config: AppConfig) -> Result<(), PipelineError> {
    let service: Arc<dyn ReasoningService> = if app_config.runtime.execute_api_calls {
        Arc::new(HttpReasoningClient::new(&app_config.reasoning)?)
    } else {
        tracing::info!("Dry run: external API calls disabled");
        Arc::new(DryRunReasoning)
    };

    let needs_translation =
        Regex::new(&app_config.patterns.needs_translation).map_err(|e| {
            PipelineError::Config(qualpipe::config::ConfigError::Invalid(format!(
                "translation pattern does not compile: {e}"
            )))
        })?;

    let gate = Arc::new(RequestGate::new(
        service,
        app_config.reasoning.max_concurrent_requests,
        needs_translation,
    ));

    let vector = build_vector_capability(&app_config);

    let pipeline = AnalysisPipeline::new(
        &cli.project_directory,
        app_config,
        gate,
        Box::new(PlainTextSource),
        vector,
    )?;

    pipeline.run().await.map(|_| ())
}

/// Wire the optional vector capability. Disabled configuration or a
/// client that cannot be built both degrade to `None` — vector features
/// are never a reason to stop a run.
fn build_vector_capability(app_config: &AppConfig) -> Option<VectorCapability> {
    if !app_config.vector.enabled || !app_config.runtime.execute_api_calls {
        return None;
    }

    match HttpEmbeddingClient::new(&app_config.reasoning, &app_config.vector) {
        Ok(embedder) => Some(VectorCapability::new(
            Arc::new(embedder),
            Arc::new(InMemoryVectorIndex::new()),
            app_config.vector.top_k,
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Vector capability unavailable; continuing without it");
            None
        }
    }
}

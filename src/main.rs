mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, EvaluateArgs, ExtractKeywordsArgs, ServeArgs};
use docrag::config::Config;
use docrag::engine::manager::IndexManager;
use docrag::server::{self, AppState};
use docrag::{embedder, eval, llm};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve(args) => serve(config, args).await,
        Commands::Evaluate(args) => evaluate(config, args).await,
        Commands::ExtractKeywords(args) => extract_keywords(config, args).await,
    }
}

async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;
    info!("Starting docrag v{}", env!("CARGO_PKG_VERSION"));

    // Model download uses blocking HTTP
    let embedder_cfg = config.embedder.clone();
    let embedder = tokio::task::spawn_blocking(move || embedder::from_config(&embedder_cfg))
        .await
        .context("Embedder initialization panicked")?
        .context("Failed to initialize embedder")?;
    let llm = llm::from_config(&config.llm).context("Failed to initialize language model")?;

    let index = IndexManager::open(&config, embedder, llm).await?;
    let state = AppState::new(&config, index);
    server::serve(&config, state).await
}

async fn evaluate(mut config: Config, args: EvaluateArgs) -> Result<()> {
    if let Some(api_url) = args.api_url {
        config.eval.api_url = api_url;
    }
    if let Some(dataset) = args.dataset {
        config.eval.dataset_path = dataset;
    }
    if let Some(results) = args.results {
        config.eval.results_path = results;
    }
    config.validate()?;

    eval::harness::run(&config.eval).await?;
    Ok(())
}

async fn extract_keywords(mut config: Config, args: ExtractKeywordsArgs) -> Result<()> {
    if let Some(dataset) = args.dataset {
        config.eval.dataset_path = dataset;
    }
    config.validate()?;

    let llm = llm::from_config(&config.llm).context("Failed to initialize language model")?;
    eval::keywords::run(llm.as_ref(), Path::new(&config.eval.dataset_path)).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

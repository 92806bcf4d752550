//! QBX Ingest - Main entry point

use anyhow::{bail, Context};
use clap::Parser;
use qbx_common::logging::init_logging;
use qbx_ingest::auth::{token_preview, OAuthTokenClient, TokenProvider};
use qbx_ingest::cli::{log_config, Cli, Commands};
use qbx_ingest::config::{DatabaseConfig, IngestConfig};
use qbx_ingest::entity::EntityKind;
use qbx_ingest::extractor::Extractor;
use qbx_ingest::loader::Loader;
use qbx_ingest::pipeline::{Pipeline, PipelineReport};
use qbx_ingest::store::{EnvelopeStore, MemoryEnvelopeStore, PgEnvelopeStore};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Characters of the access token shown by `token`
const TOKEN_PREVIEW_LEN: usize = 20;

#[tokio::main]
async fn main() {
    // `.env` feeds clap's env-backed arguments as well as LOG_* and QB_*
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let logging = log_config(cli.verbose);
    let _guard = match init_logging(&logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run {
            entity,
            window,
            dry_run,
        } => {
            let window = window.window()?;
            let config = load_config()?;
            let pipeline = build_pipeline(&config, *dry_run).await?;
            let result = pipeline.run(&entity.spec(), &window).await;
            summarize(&[(*entity, result)])
        },

        Commands::RunAll { window, dry_run } => {
            let window = window.window()?;
            let config = load_config()?;
            let pipeline = build_pipeline(&config, *dry_run).await?;
            let results = pipeline.run_all(&window).await;
            summarize(&results)
        },

        Commands::Token => {
            let config = load_config()?;
            let client = OAuthTokenClient::new(&config.api, config.credentials.clone())?;
            let token = client.access_token().await?;
            info!(
                token_prefix = %token_preview(&token, TOKEN_PREVIEW_LEN),
                environment = %config.api.environment,
                "Token exchange succeeded"
            );
            Ok(())
        },

        Commands::Migrate => {
            // Only the warehouse connection is needed here
            let database = DatabaseConfig::load().context("Failed to load database configuration")?;
            let store = PgEnvelopeStore::connect(&database).await?;
            store.migrate().await?;
            info!("Landing tables are up to date");
            Ok(())
        },
    }
}

fn load_config() -> anyhow::Result<IngestConfig> {
    IngestConfig::load().context("Failed to load configuration")
}

async fn build_pipeline(config: &IngestConfig, dry_run: bool) -> anyhow::Result<Pipeline> {
    let tokens = Arc::new(OAuthTokenClient::new(&config.api, config.credentials.clone())?);
    let extractor = Extractor::new(&config.api, tokens, config.extractor.clone())?;

    let store: Arc<dyn EnvelopeStore> = if dry_run {
        warn!("Dry run: records are loaded into memory and discarded");
        Arc::new(MemoryEnvelopeStore::new())
    } else {
        Arc::new(
            PgEnvelopeStore::connect(&config.database)
                .await
                .context("Failed to connect to destination database")?,
        )
    };

    Ok(Pipeline::new(extractor, Loader::new(store, config.load_strategy)))
}

/// Log one line per entity and fail if any entity failed or loaded partially.
fn summarize(results: &[(EntityKind, qbx_ingest::Result<PipelineReport>)]) -> anyhow::Result<()> {
    let mut failed = Vec::new();

    for (kind, result) in results {
        match result {
            Ok(report) => {
                info!(
                    entity = %kind,
                    window = %report.window,
                    fetched = report.fetched,
                    matched = report.matched,
                    pages = report.pages,
                    inserted = report.load.inserted,
                    skipped_existing = report.load.skipped_existing,
                    fallback_used = report.load.fallback_used,
                    partial = report.partial,
                    "Entity finished"
                );
                if !report.is_complete() {
                    failed.push(kind.label());
                }
            },
            Err(e) => {
                error!(entity = %kind, error = %e, "Entity failed");
                failed.push(kind.label());
            },
        }
    }

    if !failed.is_empty() {
        bail!("ingestion incomplete for: {}", failed.join(", "));
    }

    Ok(())
}

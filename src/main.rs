use anyhow::{Context, Result};
use clap::Parser;
use keeps_indexer::background_jobs::jobs::{EmbeddingBackfillJob, SearchReindexJob};
use keeps_indexer::background_jobs::{JobContext, JobScheduler};
use keeps_indexer::config::{AppConfig, CliConfig, FileConfig};
use keeps_indexer::embedding::{Embedder, OpenAiEmbedder};
use keeps_indexer::record_store::{RecordStore, SqliteRecordStore};
use keeps_indexer::search::{create_search_engine, IndexBuilder, IndexBuilderSettings};
use keeps_indexer::metrics;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML configuration file. Its values override the flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite keeps database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Base URL of the Elasticsearch/OpenSearch cluster.
    #[clap(long)]
    pub search_url: Option<String>,

    /// Base URL of the OpenAI-compatible embedding service.
    #[clap(long)]
    pub embedding_url: Option<String>,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "Starting keeps-indexer {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        search_url: cli_args.search_url,
        embedding_url: cli_args.embedding_url,
        metrics_port: cli_args.metrics_port,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening SQLite keeps database at {:?}...", config.db_path);
    let record_store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(&config.db_path)?);

    let search_engine = create_search_engine(&config.search)?;
    let index_builder = Arc::new(IndexBuilder::new(
        search_engine.clone(),
        record_store.clone(),
        IndexBuilderSettings::from(&config.search),
    ));

    let embedder: Option<Arc<dyn Embedder>> = match &config.embedding.url {
        Some(url) => {
            info!(
                "Embedding service configured at {} (model {})",
                url, config.embedding.model
            );
            Some(Arc::new(OpenAiEmbedder::new(
                url.clone(),
                config.embedding.model.clone(),
                config.embedding.api_key.clone(),
                config.search.dimensions,
                config.embedding.timeout,
            )?))
        }
        None => None,
    };

    let context = JobContext::new(
        record_store,
        search_engine,
        index_builder,
        embedder.clone(),
        config.search.alias.clone(),
    );
    let scheduler = JobScheduler::new(
        context,
        config.scheduler.pool_capacity,
        config.scheduler.job_timeout,
    );

    let scheduler_settings = &config.scheduler;
    if scheduler_settings.reindex_enabled {
        scheduler
            .register_job(Arc::new(SearchReindexJob::new(
                scheduler_settings.reindex_schedule.clone(),
                Some(scheduler_settings.reindex_timeout),
            )))
            .await?;
    }
    if scheduler_settings.backfill_enabled {
        if embedder.is_some() {
            scheduler
                .register_job(Arc::new(EmbeddingBackfillJob::new(
                    scheduler_settings.backfill_schedule.clone(),
                    Some(scheduler_settings.backfill_timeout),
                )))
                .await?;
        } else {
            warn!("Embedding backfill enabled but no embedding url configured, skipping it");
        }
    }

    scheduler.start();

    if config.metrics_port != 0 {
        let metrics_port = config.metrics_port;
        info!("Metrics available at port {}!", metrics_port);
        tokio::spawn(async move {
            if let Err(e) = metrics::run_metrics_server(metrics_port).await {
                error!("Metrics server failed: {:#}", e);
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down...");
    scheduler.stop().await;
    Ok(())
}

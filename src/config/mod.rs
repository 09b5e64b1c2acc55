mod file_config;

pub use file_config::{EmbeddingConfig, FileConfig, SchedulerConfig, SearchConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ALIAS: &str = "app-keeps";
pub const DEFAULT_BULK_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_BULK_MAX_ITEMS: usize = 1000;
pub const DEFAULT_DIMENSIONS: usize = 1024;
pub const DEFAULT_POOL_CAPACITY: usize = 10;
pub const DEFAULT_BACKFILL_SCHEDULE: &str = "0 */10 * * * *";
pub const DEFAULT_REINDEX_SCHEDULE: &str = "0 0 3 * * *";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub search_url: Option<String>,
    pub embedding_url: Option<String>,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SearchBackend {
    /// Elasticsearch / OpenSearch over HTTP
    #[default]
    Http,
    /// In-process engine, nothing survives a restart
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// 0 disables the metrics endpoint.
    pub metrics_port: u16,

    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub alias: String,
    pub bulk_max_bytes: usize,
    pub bulk_max_items: usize,
    pub dimensions: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Http,
            url: None,
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            alias: DEFAULT_ALIAS.to_string(),
            bulk_max_bytes: DEFAULT_BULK_MAX_BYTES,
            bulk_max_items: DEFAULT_BULK_MAX_ITEMS,
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Without a url the backfill job is not registered.
    pub url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            url: None,
            model: "bge-m3".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub pool_capacity: usize,
    pub job_timeout: Duration,
    pub backfill_enabled: bool,
    pub backfill_schedule: String,
    /// The backfill ends in a full rebuild, so this covers embedding calls
    /// plus everything `reindex_timeout` covers.
    pub backfill_timeout: Duration,
    pub reindex_enabled: bool,
    pub reindex_schedule: String,
    pub reindex_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            job_timeout: Duration::from_secs(60),
            backfill_enabled: true,
            backfill_schedule: DEFAULT_BACKFILL_SCHEDULE.to_string(),
            backfill_timeout: Duration::from_secs(900),
            reindex_enabled: true,
            reindex_schedule: DEFAULT_REINDEX_SCHEDULE.to_string(),
            reindex_timeout: Duration::from_secs(600),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let search = Self::resolve_search(cli, file.search.unwrap_or_default())?;
        let embedding = Self::resolve_embedding(cli, file.embedding.unwrap_or_default());
        let scheduler = Self::resolve_scheduler(file.scheduler.unwrap_or_default())?;

        Ok(Self {
            db_path,
            metrics_port,
            search,
            embedding,
            scheduler,
        })
    }

    fn resolve_search(cli: &CliConfig, file: SearchConfig) -> Result<SearchSettings> {
        let defaults = SearchSettings::default();

        let backend = match file.backend {
            Some(s) => parse_search_backend(&s)
                .ok_or_else(|| anyhow::anyhow!("Unknown search backend: {}", s))?,
            None => defaults.backend,
        };
        let url = file.url.or_else(|| cli.search_url.clone());
        if backend == SearchBackend::Http && url.is_none() {
            bail!("The http search backend requires --search-url or search.url");
        }

        let bulk_max_bytes = file.bulk_max_bytes.unwrap_or(defaults.bulk_max_bytes);
        let bulk_max_items = file.bulk_max_items.unwrap_or(defaults.bulk_max_items);
        if bulk_max_bytes == 0 || bulk_max_items == 0 {
            bail!("Bulk thresholds must be greater than zero");
        }
        let dimensions = file.dimensions.unwrap_or(defaults.dimensions);
        if dimensions == 0 {
            bail!("Vector dimensions must be greater than zero");
        }
        let alias = file.alias.unwrap_or(defaults.alias);
        if alias.is_empty() || alias.contains('*') || alias.contains(',') {
            bail!("Invalid search alias: {:?}", alias);
        }

        Ok(SearchSettings {
            backend,
            url,
            username: file.username,
            password: file.password,
            timeout: file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            alias,
            bulk_max_bytes,
            bulk_max_items,
            dimensions,
        })
    }

    fn resolve_embedding(cli: &CliConfig, file: EmbeddingConfig) -> EmbeddingSettings {
        let defaults = EmbeddingSettings::default();
        EmbeddingSettings {
            url: file.url.or_else(|| cli.embedding_url.clone()),
            model: file.model.unwrap_or(defaults.model),
            api_key: file.api_key,
            timeout: file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    fn resolve_scheduler(file: SchedulerConfig) -> Result<SchedulerSettings> {
        let defaults = SchedulerSettings::default();
        let pool_capacity = file.pool_capacity.unwrap_or(defaults.pool_capacity);
        if pool_capacity == 0 {
            bail!("scheduler.pool_capacity must be greater than zero");
        }
        Ok(SchedulerSettings {
            pool_capacity,
            job_timeout: file
                .job_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            backfill_enabled: file.backfill_enabled.unwrap_or(defaults.backfill_enabled),
            backfill_schedule: file
                .backfill_schedule
                .unwrap_or(defaults.backfill_schedule),
            backfill_timeout: file
                .backfill_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.backfill_timeout),
            reindex_enabled: file.reindex_enabled.unwrap_or(defaults.reindex_enabled),
            reindex_schedule: file.reindex_schedule.unwrap_or(defaults.reindex_schedule),
            reindex_timeout: file
                .reindex_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reindex_timeout),
        })
    }
}

/// Parses a search backend name.
/// Uses clap's ValueEnum trait for parsing.
fn parse_search_backend(s: &str) -> Option<SearchBackend> {
    SearchBackend::from_str(s, true).ok()
}

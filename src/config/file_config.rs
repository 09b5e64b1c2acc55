use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub search: Option<SearchConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Search backend to use: "http", "memory"
    pub backend: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub alias: Option<String>,
    pub bulk_max_bytes: Option<usize>,
    pub bulk_max_items: Option<usize>,
    pub dimensions: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub pool_capacity: Option<usize>,
    pub job_timeout_secs: Option<u64>,
    pub backfill_enabled: Option<bool>,
    pub backfill_schedule: Option<String>,
    pub backfill_timeout_secs: Option<u64>,
    pub reindex_enabled: Option<bool>,
    pub reindex_schedule: Option<String>,
    pub reindex_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let raw = r#"
            db_path = "/data/keeps.db"

            [search]
            backend = "http"
            url = "http://es:9200"
            alias = "my-keeps"
            bulk_max_items = 200

            [scheduler]
            backfill_schedule = "@every 5m"
            backfill_timeout_secs = 1200
            reindex_enabled = false
        "#;
        let config: FileConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.db_path.as_deref(), Some("/data/keeps.db"));
        let search = config.search.unwrap();
        assert_eq!(search.backend.as_deref(), Some("http"));
        assert_eq!(search.alias.as_deref(), Some("my-keeps"));
        assert_eq!(search.bulk_max_items, Some(200));
        assert!(search.bulk_max_bytes.is_none());
        let scheduler = config.scheduler.unwrap();
        assert_eq!(scheduler.backfill_schedule.as_deref(), Some("@every 5m"));
        assert_eq!(scheduler.backfill_timeout_secs, Some(1200));
        assert!(scheduler.reindex_timeout_secs.is_none());
        assert_eq!(scheduler.reindex_enabled, Some(false));
        assert!(config.embedding.is_none());
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(FileConfig::load(Path::new("/nonexistent/keeps.toml")).is_err());
    }
}

//! Factory function for creating search engine instances

use super::{BasicAuth, HttpSearchEngine, InMemorySearchEngine, SearchEngine};
use crate::config::{SearchBackend, SearchSettings};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Create a search engine client based on the configured backend
pub fn create_search_engine(settings: &SearchSettings) -> Result<Arc<dyn SearchEngine>> {
    let backend = if cfg!(feature = "memory_search") {
        SearchBackend::Memory
    } else {
        settings.backend
    };
    match backend {
        SearchBackend::Http => {
            let url = settings
                .url
                .as_deref()
                .context("search url is required for the http backend")?;
            let auth = settings.username.as_ref().map(|username| BasicAuth {
                username: username.clone(),
                password: settings.password.clone().unwrap_or_default(),
            });
            info!(
                "Creating HTTP search engine client for {} (auth: {})",
                url,
                auth.is_some()
            );
            Ok(Arc::new(HttpSearchEngine::new(url, auth, settings.timeout)?))
        }
        SearchBackend::Memory => {
            warn!("Creating in-memory search engine, the index is lost on restart");
            Ok(Arc::new(InMemorySearchEngine::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "memory_search"))]
    fn test_http_requires_url() {
        let settings = SearchSettings {
            backend: SearchBackend::Http,
            url: None,
            ..Default::default()
        };
        assert!(create_search_engine(&settings).is_err());
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let settings = SearchSettings {
            backend: SearchBackend::Memory,
            ..Default::default()
        };
        let engine = create_search_engine(&settings).unwrap();
        assert!(engine.get_alias("app-keeps").await.unwrap().is_empty());
    }
}

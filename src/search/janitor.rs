use super::engine::SearchEngine;
use super::index_version::IndexVersion;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Deletes superseded physical indices of an alias.
///
/// Never fails: every error is logged and the run gives up.
#[derive(Clone)]
pub struct IndexJanitor {
    engine: Arc<dyn SearchEngine>,
}

impl IndexJanitor {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }

    /// Delete the `<alias>_<timestamp>` indices superseded by `current`.
    /// Versions newer than `current` belong to a later rebuild and are kept.
    /// Returns how many indices were deleted.
    pub async fn cleanup(&self, alias: &str, current: &str) -> usize {
        let pattern = IndexVersion::pattern(alias);
        let current_version = IndexVersion::parse(alias, current);
        let names = match self.engine.cat_indices(&pattern).await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list indices matching {}: {}", pattern, e);
                return 0;
            }
        };

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| name != current)
            .filter(|name| match IndexVersion::parse(alias, name) {
                Some(version) => match &current_version {
                    Some(current) if version.created_at > current.created_at => {
                        debug!("Leaving {} alone, newer than {}", name, current.name());
                        false
                    }
                    _ => true,
                },
                None => {
                    debug!("Leaving {} alone, not a version of {}", name, alias);
                    false
                }
            })
            .collect();

        if stale.is_empty() {
            debug!("No stale indices for alias {}", alias);
            return 0;
        }

        match self.engine.delete_indices(&stale, true).await {
            Ok(()) => {
                info!("Deleted {} stale indices of {}: {:?}", stale.len(), alias, stale);
                stale.len()
            }
            Err(e) => {
                error!("Failed to delete stale indices {:?}: {}", stale, e);
                0
            }
        }
    }

    /// Run [`Self::cleanup`] on its own task.
    ///
    /// The task is not tied to the caller: dropping or cancelling the caller
    /// does not stop it.
    pub fn spawn_cleanup(&self, alias: &str, current: &str) -> JoinHandle<usize> {
        let janitor = self.clone();
        let alias = alias.to_string();
        let current = current.to_string();
        tokio::spawn(async move { janitor.cleanup(&alias, &current).await })
    }
}

use super::engine::{AliasAction, SearchEngine, SearchError};
use super::index_version::IndexVersion;
use std::sync::Arc;
use tracing::info;

/// Repoints an alias to a new physical index in one atomic request.
pub struct AliasSwitcher {
    engine: Arc<dyn SearchEngine>,
}

impl AliasSwitcher {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }

    /// Remove `alias` from every `<alias>_*` index and add it to `new_index`.
    pub async fn switch(&self, alias: &str, new_index: &str) -> Result<(), SearchError> {
        let actions = [
            AliasAction::Remove {
                index: IndexVersion::pattern(alias),
                alias: alias.to_string(),
                must_exist: Some(false),
            },
            AliasAction::Add {
                index: new_index.to_string(),
                alias: alias.to_string(),
            },
        ];
        self.engine.update_aliases(&actions).await?;
        info!("Alias {} now points to {}", alias, new_index);
        Ok(())
    }
}

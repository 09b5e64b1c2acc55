//! In-process search engine.
//!
//! Keeps indices, documents and aliases in memory. Used by the `memory`
//! backend and by tests, which can make individual operations fail on demand.

use super::engine::{
    matches_pattern, AliasAction, BulkItemError, BulkItemResult, BulkResponse, SearchEngine,
    SearchError,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Operations that can be made to fail with [`InMemorySearchEngine::fail_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    CreateIndex,
    Bulk,
    Refresh,
    UpdateAliases,
    CatIndices,
    DeleteIndices,
    GetAlias,
}

#[derive(Debug, Default)]
struct StoredIndex {
    mapping: JsonValue,
    documents: BTreeMap<String, JsonValue>,
    refreshed: bool,
}

#[derive(Default)]
struct EngineState {
    indices: BTreeMap<String, StoredIndex>,
    /// alias -> indices
    aliases: HashMap<String, Vec<String>>,
    failing: HashSet<EngineOp>,
    rejected_ids: HashSet<String>,
    deleted: Vec<String>,
}

#[derive(Default)]
pub struct InMemorySearchEngine {
    state: Mutex<EngineState>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail until [`Self::clear_failures`].
    pub fn fail_on(&self, op: EngineOp) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing.clear();
        state.rejected_ids.clear();
    }

    /// Bulk items with this document id are answered with an item-level error.
    pub fn reject_document(&self, id: impl Into<String>) {
        self.lock().rejected_ids.insert(id.into());
    }

    /// Create an index and point `alias` at it, bypassing failure injection.
    pub fn seed_index(&self, name: &str, alias: Option<&str>) {
        let mut state = self.lock();
        state.indices.entry(name.to_string()).or_default();
        if let Some(alias) = alias {
            state
                .aliases
                .entry(alias.to_string())
                .or_default()
                .push(name.to_string());
        }
    }

    pub fn index_names(&self) -> Vec<String> {
        self.lock().indices.keys().cloned().collect()
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.lock().indices.contains_key(name)
    }

    /// Names of all indices deleted so far, in deletion order.
    pub fn deleted_indices(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn mapping(&self, index: &str) -> Option<JsonValue> {
        self.lock().indices.get(index).map(|i| i.mapping.clone())
    }

    pub fn is_refreshed(&self, index: &str) -> bool {
        self.lock()
            .indices
            .get(index)
            .map(|i| i.refreshed)
            .unwrap_or(false)
    }

    /// Number of documents reachable through an index or alias name.
    /// Returns `None` if the name resolves to nothing.
    pub fn document_count(&self, target: &str) -> Option<usize> {
        let state = self.lock();
        let names = Self::resolve(&state, target);
        if names.is_empty() {
            return None;
        }
        Some(
            names
                .iter()
                .filter_map(|n| state.indices.get(n))
                .map(|i| i.documents.len())
                .sum(),
        )
    }

    /// Fetch one document through an index or alias name.
    pub fn get_document(&self, target: &str, id: &str) -> Option<JsonValue> {
        let state = self.lock();
        Self::resolve(&state, target)
            .iter()
            .filter_map(|n| state.indices.get(n))
            .find_map(|i| i.documents.get(id).cloned())
    }

    fn resolve(state: &EngineState, target: &str) -> Vec<String> {
        if let Some(indices) = state.aliases.get(target) {
            return indices.clone();
        }
        if state.indices.contains_key(target) {
            return vec![target.to_string()];
        }
        Vec::new()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        // A panic while holding the lock cannot leave the maps half-updated
        // in a way later calls care about, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(state: &EngineState, op: EngineOp) -> Result<(), SearchError> {
        if state.failing.contains(&op) {
            return Err(SearchError::Transport(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn bulk_locked(state: &mut EngineState, body: &str) -> Result<BulkResponse, SearchError> {
        let mut lines = body.lines().filter(|l| !l.trim().is_empty());
        let mut items = Vec::new();

        while let Some(action_line) = lines.next() {
            let action: HashMap<String, JsonValue> = serde_json::from_str(action_line)
                .map_err(|e| SearchError::Rejected(format!("malformed action line: {}", e)))?;
            let (op_type, meta) = action
                .into_iter()
                .next()
                .ok_or_else(|| SearchError::Rejected("empty action line".to_string()))?;
            let index = meta
                .get("_index")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let id = meta
                .get("_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let result = if op_type == "delete" {
                let found = state
                    .indices
                    .get_mut(&index)
                    .and_then(|i| i.documents.remove(&id))
                    .is_some();
                Self::item(&index, &id, if found { 200 } else { 404 }, None)
            } else {
                let doc_line = lines.next().ok_or_else(|| {
                    SearchError::Rejected(format!("missing document line for {}", id))
                })?;
                let document: JsonValue = serde_json::from_str(doc_line)
                    .map_err(|e| SearchError::Rejected(format!("malformed document: {}", e)))?;

                if state.rejected_ids.contains(&id) {
                    Self::item(
                        &index,
                        &id,
                        400,
                        Some(("mapper_parsing_exception", "document rejected")),
                    )
                } else {
                    match state.indices.get_mut(&index) {
                        Some(stored) => {
                            let created = stored.documents.insert(id.clone(), document).is_none();
                            stored.refreshed = false;
                            Self::item(&index, &id, if created { 201 } else { 200 }, None)
                        }
                        None => Self::item(
                            &index,
                            &id,
                            404,
                            Some(("index_not_found_exception", "no such index")),
                        ),
                    }
                }
            };
            items.push(HashMap::from([(op_type, result)]));
        }

        let errors = items.iter().flat_map(|i| i.values()).any(|r| r.is_failure());
        Ok(BulkResponse {
            took: 1,
            errors,
            items,
        })
    }

    fn item(index: &str, id: &str, status: u16, error: Option<(&str, &str)>) -> BulkItemResult {
        BulkItemResult {
            index: index.to_string(),
            id: id.to_string(),
            status,
            error: error.map(|(error_type, reason)| BulkItemError {
                error_type: error_type.to_string(),
                reason: reason.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn create_index(&self, name: &str, body: &JsonValue) -> Result<(), SearchError> {
        let mut state = self.lock();
        Self::check(&state, EngineOp::CreateIndex)?;
        if state.indices.contains_key(name) || state.aliases.contains_key(name) {
            return Err(SearchError::Status {
                status: 400,
                body: format!("resource_already_exists_exception: {}", name),
            });
        }
        state.indices.insert(
            name.to_string(),
            StoredIndex {
                mapping: body.clone(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn bulk(&self, body: String) -> Result<BulkResponse, SearchError> {
        let mut state = self.lock();
        Self::check(&state, EngineOp::Bulk)?;
        Self::bulk_locked(&mut state, &body)
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        let mut state = self.lock();
        Self::check(&state, EngineOp::Refresh)?;
        match state.indices.get_mut(index) {
            Some(stored) => {
                stored.refreshed = true;
                Ok(())
            }
            None => Err(SearchError::Status {
                status: 404,
                body: format!("index_not_found_exception: {}", index),
            }),
        }
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError> {
        let mut state = self.lock();
        Self::check(&state, EngineOp::UpdateAliases)?;

        // Validate everything first so a bad action leaves the aliases untouched.
        let mut aliases = state.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if !state.indices.contains_key(index) {
                        return Err(SearchError::Status {
                            status: 404,
                            body: format!("index_not_found_exception: {}", index),
                        });
                    }
                    let targets = aliases.entry(alias.clone()).or_default();
                    if !targets.contains(index) {
                        targets.push(index.clone());
                    }
                }
                AliasAction::Remove {
                    index,
                    alias,
                    must_exist,
                } => {
                    let targets = aliases.entry(alias.clone()).or_default();
                    let before = targets.len();
                    targets.retain(|t| !matches_pattern(index, t));
                    if before == targets.len() && must_exist.unwrap_or(true) {
                        return Err(SearchError::Status {
                            status: 404,
                            body: format!("aliases_not_found_exception: {}", alias),
                        });
                    }
                }
            }
        }
        aliases.retain(|_, targets| !targets.is_empty());
        state.aliases = aliases;
        Ok(())
    }

    async fn cat_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError> {
        let state = self.lock();
        Self::check(&state, EngineOp::CatIndices)?;
        Ok(state
            .indices
            .keys()
            .filter(|name| matches_pattern(pattern, name))
            .cloned()
            .collect())
    }

    async fn delete_indices(
        &self,
        names: &[String],
        ignore_missing: bool,
    ) -> Result<(), SearchError> {
        let mut state = self.lock();
        Self::check(&state, EngineOp::DeleteIndices)?;
        if !ignore_missing {
            if let Some(missing) = names.iter().find(|n| !state.indices.contains_key(*n)) {
                return Err(SearchError::Status {
                    status: 404,
                    body: format!("index_not_found_exception: {}", missing),
                });
            }
        }
        for name in names {
            if state.indices.remove(name).is_some() {
                state.deleted.push(name.clone());
            }
            for targets in state.aliases.values_mut() {
                targets.retain(|t| t != name);
            }
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }

    async fn get_alias(&self, alias: &str) -> Result<Vec<String>, SearchError> {
        let state = self.lock();
        Self::check(&state, EngineOp::GetAlias)?;
        let mut indices = state.aliases.get(alias).cloned().unwrap_or_default();
        indices.sort();
        Ok(indices)
    }
}

//! Search engine collaborator trait and wire types.
//!
//! The operation set mirrors the Elasticsearch/OpenSearch REST primitives the
//! rebuild pipeline needs, nothing more.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search engine request failed: {0}")]
    Transport(String),

    #[error("Search engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid search engine response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Rejected(String),
}

/// One action of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add {
        index: String,
        alias: String,
    },
    Remove {
        index: String,
        alias: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        must_exist: Option<bool>,
    },
}

/// Response of a `_bulk` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    /// Each item is keyed by its operation type ("index", "create", ...).
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BulkItemError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub reason: String,
}

impl BulkItemResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }
}

impl BulkResponse {
    pub fn item_results(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().flat_map(|item| item.values())
    }

    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.item_results().filter(|item| item.is_failure())
    }
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create a physical index with the given settings and mappings.
    async fn create_index(&self, name: &str, body: &JsonValue) -> Result<(), SearchError>;

    /// Send an NDJSON bulk body. Item-level failures are reported in the
    /// response, only a rejected request is an `Err`.
    async fn bulk(&self, body: String) -> Result<BulkResponse, SearchError>;

    async fn refresh(&self, index: &str) -> Result<(), SearchError>;

    /// Apply all actions as a single atomic operation.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError>;

    /// Names of the physical indices matching a wildcard pattern.
    async fn cat_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError>;

    async fn delete_indices(&self, names: &[String], ignore_missing: bool)
        -> Result<(), SearchError>;

    /// Physical indices the alias currently resolves to.
    async fn get_alias(&self, alias: &str) -> Result<Vec<String>, SearchError>;
}

/// Match `name` against an index pattern where `*` matches any run of characters.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !name.starts_with(first) || name.len() < first.len() + last.len() {
        return false;
    }
    if !name.ends_with(last) {
        return false;
    }

    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

//! HTTP client for Elasticsearch / OpenSearch.

use super::engine::{AliasAction, BulkResponse, SearchEngine, SearchError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

pub struct HttpSearchEngine {
    client: Client,
    base_url: String,
    auth: Option<BasicAuth>,
}

#[derive(Deserialize)]
struct CatIndexRow {
    index: String,
}

impl HttpSearchEngine {
    /// Create a new search engine client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the cluster (e.g., "http://localhost:9200")
    /// * `auth` - Optional basic authentication
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        auth: Option<BasicAuth>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SearchError> {
        let request = match &self.auth {
            Some(auth) => request.basic_auth(&auth.username, Some(&auth.password)),
            None => request,
        };
        request
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))
    }

    async fn expect_success(response: Response) -> Result<Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn create_index(&self, name: &str, body: &JsonValue) -> Result<(), SearchError> {
        debug!("PUT index {}", name);
        let response = self.send(self.client.put(self.url(name)).json(body)).await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn bulk(&self, body: String) -> Result<BulkResponse, SearchError> {
        let request = self
            .client
            .post(self.url("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = Self::expect_success(self.send(request).await?).await?;
        response
            .json::<BulkResponse>()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .send(self.client.post(self.url(&format!("{}/_refresh", index))))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchError> {
        let body = serde_json::json!({ "actions": actions });
        let response = self
            .send(self.client.post(self.url("_aliases")).json(&body))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn cat_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError> {
        let request = self
            .client
            .get(self.url(&format!("_cat/indices/{}", pattern)))
            .query(&[("format", "json"), ("h", "index")]);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let rows: Vec<CatIndexRow> = Self::expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        let mut names: Vec<String> = rows.into_iter().map(|r| r.index).collect();
        names.sort();
        Ok(names)
    }

    async fn delete_indices(
        &self,
        names: &[String],
        ignore_missing: bool,
    ) -> Result<(), SearchError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut request = self.client.delete(self.url(&names.join(",")));
        if ignore_missing {
            request = request.query(&[("ignore_unavailable", "true")]);
        }
        let response = self.send(request).await?;
        if ignore_missing && response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn get_alias(&self, alias: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .send(self.client.get(self.url(&format!("_alias/{}", alias))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: HashMap<String, JsonValue> = Self::expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        let mut indices: Vec<String> = body.into_keys().collect();
        indices.sort();
        Ok(indices)
    }
}

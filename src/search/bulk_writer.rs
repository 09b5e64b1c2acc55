//! Batched bulk writes to the search engine.

use super::engine::{SearchEngine, SearchError};
use crate::metrics;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a bulk request the engine accepted.
///
/// Item-level rejections are counted here; a request the engine refused
/// outright is a [`SearchError`] instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkFlushOutcome {
    pub items: usize,
    pub failed: usize,
}

impl BulkFlushOutcome {
    pub fn succeeded(&self) -> usize {
        self.items.saturating_sub(self.failed)
    }

    fn merge(&mut self, other: BulkFlushOutcome) {
        self.items += other.items;
        self.failed += other.failed;
    }
}

pub struct BulkWriter {
    engine: Arc<dyn SearchEngine>,
    max_bytes: usize,
    max_items: usize,
    body: String,
    items: usize,
    totals: BulkFlushOutcome,
}

impl BulkWriter {
    pub fn new(engine: Arc<dyn SearchEngine>, max_bytes: usize, max_items: usize) -> Self {
        Self {
            engine,
            max_bytes,
            max_items,
            body: String::new(),
            items: 0,
            totals: BulkFlushOutcome::default(),
        }
    }

    /// Append one action line and its data line.
    pub fn add(&mut self, action_line: &str, data_line: &str) {
        self.body.push_str(action_line);
        self.body.push('\n');
        self.body.push_str(data_line);
        self.body.push('\n');
        self.items += 1;
    }

    /// Serialize `document` as an index operation into `index` with `id`.
    ///
    /// Nothing is buffered if serialization fails.
    pub fn add_document<T: Serialize>(
        &mut self,
        index: &str,
        id: &str,
        document: &T,
    ) -> Result<(), serde_json::Error> {
        let data_line = serde_json::to_string(document)?;
        let action_line = json!({ "index": { "_index": index, "_id": id } }).to_string();
        self.add(&action_line, &data_line);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn byte_len(&self) -> usize {
        self.body.len()
    }

    /// Outcomes of every flush so far, added up.
    pub fn totals(&self) -> BulkFlushOutcome {
        self.totals
    }

    /// True once the buffer has reached either limit. Reaching the limit
    /// counts: with `max_items = 1000` the 1000th item triggers the flush, so
    /// no request ever carries more than `max_items` documents.
    pub fn should_flush(&self) -> bool {
        self.items > 0 && (self.body.len() >= self.max_bytes || self.items >= self.max_items)
    }

    /// Flush only if a threshold has been reached.
    pub async fn maybe_flush(&mut self) -> Result<Option<BulkFlushOutcome>, SearchError> {
        if !self.should_flush() {
            return Ok(None);
        }
        self.flush().await.map(Some)
    }

    /// Send everything buffered as one request.
    ///
    /// The buffer is empty afterwards whether or not the request succeeded.
    pub async fn flush(&mut self) -> Result<BulkFlushOutcome, SearchError> {
        if self.is_empty() {
            return Ok(BulkFlushOutcome::default());
        }

        let body = std::mem::take(&mut self.body);
        let items = std::mem::replace(&mut self.items, 0);
        debug!("Flushing {} bulk items ({} bytes)", items, body.len());

        let response = self.engine.bulk(body).await?;

        let mut failed = 0;
        for item in response.failures() {
            failed += 1;
            let reason = item
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.error_type, e.reason))
                .unwrap_or_else(|| format!("status {}", item.status));
            warn!(
                "Bulk item failed: index={} id={} reason={}",
                item.index, item.id, reason
            );
        }

        let outcome = BulkFlushOutcome { items, failed };
        metrics::record_bulk_items(outcome.succeeded(), outcome.failed);
        self.totals.merge(outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{EngineOp, InMemorySearchEngine};
    use serde_json::json;

    async fn writer(max_bytes: usize, max_items: usize) -> (Arc<InMemorySearchEngine>, BulkWriter) {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.create_index("i", &json!({})).await.unwrap();
        let writer = BulkWriter::new(engine.clone(), max_bytes, max_items);
        (engine, writer)
    }

    #[tokio::test]
    async fn test_flushes_on_item_threshold() {
        let (engine, mut writer) = writer(usize::MAX, 3).await;

        for i in 0..2 {
            writer
                .add_document("i", &i.to_string(), &json!({"n": i}))
                .unwrap();
            assert!(!writer.should_flush());
            assert_eq!(writer.maybe_flush().await.unwrap(), None);
        }
        writer.add_document("i", "2", &json!({"n": 2})).unwrap();
        assert!(writer.should_flush());

        let outcome = writer.maybe_flush().await.unwrap().unwrap();
        assert_eq!(outcome, BulkFlushOutcome { items: 3, failed: 0 });
        assert!(writer.is_empty());
        assert_eq!(writer.byte_len(), 0);
        assert_eq!(engine.document_count("i"), Some(3));
    }

    #[tokio::test]
    async fn test_flushes_on_byte_threshold() {
        let (_engine, mut writer) = writer(64, usize::MAX).await;

        writer.add("{\"index\":{\"_index\":\"i\",\"_id\":\"a\"}}", "{}");
        assert!(!writer.should_flush());
        writer.add(
            "{\"index\":{\"_index\":\"i\",\"_id\":\"b\"}}",
            "{\"text\":\"long enough\"}",
        );
        assert!(writer.should_flush());
        assert!(writer.maybe_flush().await.unwrap().is_some());
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_is_reached_not_passed() {
        let action = "{\"index\":{\"_index\":\"i\",\"_id\":\"a\"}}";
        let doc = "{\"n\":1}";
        let (_engine, mut sizing) = writer(usize::MAX, usize::MAX).await;
        sizing.add(action, doc);
        let pair_len = sizing.byte_len();

        let (_engine, mut exact) = writer(pair_len, usize::MAX).await;
        exact.add(action, doc);
        assert!(exact.should_flush());

        let (_engine, mut roomy) = writer(pair_len + 1, usize::MAX).await;
        roomy.add(action, doc);
        assert!(!roomy.should_flush());

        let (_engine, mut single) = writer(usize::MAX, 1).await;
        single.add(action, doc);
        assert!(single.should_flush());
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let (engine, mut writer) = writer(1, 1).await;
        engine.fail_on(EngineOp::Bulk);
        assert_eq!(writer.flush().await.unwrap(), BulkFlushOutcome::default());
        assert!(!writer.should_flush());
    }

    #[tokio::test]
    async fn test_item_failures_are_counted_not_fatal() {
        let (engine, mut writer) = writer(usize::MAX, 100).await;
        engine.reject_document("bad");

        for id in ["a", "bad", "c"] {
            writer.add_document("i", id, &json!({"id": id})).unwrap();
        }
        let outcome = writer.flush().await.unwrap();
        assert_eq!(outcome.items, 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(writer.totals(), outcome);
    }

    #[tokio::test]
    async fn test_buffer_reset_after_failed_flush() {
        let (engine, mut writer) = writer(usize::MAX, 100).await;
        engine.fail_on(EngineOp::Bulk);

        writer.add_document("i", "a", &json!({})).unwrap();
        assert!(writer.flush().await.is_err());
        assert!(writer.is_empty());
        assert_eq!(writer.byte_len(), 0);
        assert_eq!(writer.totals(), BulkFlushOutcome::default());
    }
}

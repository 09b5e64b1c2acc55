//! Fake collaborators

use super::constants::{DIMENSIONS, FAILING_MARKER};
use async_trait::async_trait;
use keeps_indexer::embedding::{Embedder, EmbeddingError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Embeds text as `[len, 1, 0]`. Texts containing [`FAILING_MARKER`] fail
/// like an unreachable service.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains(FAILING_MARKER) {
            return Err(EmbeddingError::Connection("connection refused".to_string()));
        }
        Ok(vec![text.len() as f32, 1.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

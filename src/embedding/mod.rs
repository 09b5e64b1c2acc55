//! Embedding computation collaborator.

mod openai;

pub use openai::OpenAiEmbedder;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Connection(String),

    #[error("Embedding service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },

    #[error("Nothing to embed")]
    EmptyInput,
}

/// Computes a vector representation of a piece of text.
///
/// Implementations must be safe to call repeatedly; callers treat every
/// error as transient and simply retry on the next run.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimensions(&self) -> usize;
}

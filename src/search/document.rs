//! Projection of a keep into a search document.

use crate::record_store::{EmbeddingField, Keep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Keep {keep_id} has non-finite values in its {field} embedding")]
    NonFiniteVector {
        keep_id: String,
        field: EmbeddingField,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct KeepDocument<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub labels: &'a [String],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_vector: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_vector: Option<&'a [f32]>,
}

impl<'a> KeepDocument<'a> {
    /// Vectors whose length is not `dimensions` are left out, the index
    /// would reject the whole document otherwise. Non-finite values have no
    /// JSON representation and fail the projection.
    pub fn from_keep(keep: &'a Keep, dimensions: usize) -> Result<Self, DocumentError> {
        let vector = |field: EmbeddingField| -> Result<Option<&'a [f32]>, DocumentError> {
            let Some(vector) = keep.embedding(field) else {
                return Ok(None);
            };
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(DocumentError::NonFiniteVector {
                    keep_id: keep.id.clone(),
                    field,
                });
            }
            if vector.len() != dimensions {
                warn!(
                    "Keep {} has a {} embedding of {} dimensions, expected {}; leaving it out",
                    keep.id,
                    field,
                    vector.len(),
                    dimensions
                );
                return Ok(None);
            }
            Ok(Some(vector))
        };

        Ok(Self {
            id: &keep.id,
            title: &keep.title,
            content: &keep.content,
            labels: &keep.labels,
            created_at: keep.created_at,
            updated_at: keep.updated_at,
            title_vector: vector(EmbeddingField::Title)?,
            content_vector: vector(EmbeddingField::Content)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep(title_embedding: Option<Vec<f32>>, content_embedding: Option<Vec<f32>>) -> Keep {
        Keep {
            id: "k1".to_string(),
            title: "東京 trip".to_string(),
            content: "pack light".to_string(),
            labels: vec!["travel".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            title_embedding,
            content_embedding,
        }
    }

    #[test]
    fn test_projection_includes_vectors() {
        let keep = keep(Some(vec![0.5, 0.5]), Some(vec![1.0, 0.0]));
        let json = serde_json::to_value(KeepDocument::from_keep(&keep, 2).unwrap()).unwrap();
        assert_eq!(json["id"], "k1");
        assert_eq!(json["title"], "東京 trip");
        assert_eq!(json["labels"], serde_json::json!(["travel"]));
        assert_eq!(json["title_vector"], serde_json::json!([0.5, 0.5]));
        assert_eq!(json["content_vector"], serde_json::json!([1.0, 0.0]));
    }

    #[test]
    fn test_missing_and_mismatched_vectors_are_omitted() {
        let keep = keep(None, Some(vec![1.0, 0.0, 0.0]));
        let json = serde_json::to_value(KeepDocument::from_keep(&keep, 2).unwrap()).unwrap();
        assert!(json.get("title_vector").is_none());
        assert!(json.get("content_vector").is_none());
        assert_eq!(json["content"], "pack light");
    }

    #[test]
    fn test_non_finite_vector_fails() {
        let keep = keep(Some(vec![f32::NAN, 0.0]), None);
        let err = KeepDocument::from_keep(&keep, 2).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::NonFiniteVector {
                field: EmbeddingField::Title,
                ..
            }
        ));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A derived vector field attached to a keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingField {
    Title,
    Content,
}

impl EmbeddingField {
    pub const ALL: [EmbeddingField; 2] = [EmbeddingField::Title, EmbeddingField::Content];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingField::Title => "title",
            EmbeddingField::Content => "content",
        }
    }

    /// Column holding the vector in the record store.
    pub fn column(&self) -> &'static str {
        match self {
            EmbeddingField::Title => "title_embedding",
            EmbeddingField::Content => "content_embedding",
        }
    }

    /// Name of the dense-vector field in the search document.
    pub fn document_field(&self) -> &'static str {
        match self {
            EmbeddingField::Title => "title_vector",
            EmbeddingField::Content => "content_vector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(EmbeddingField::Title),
            "content" => Some(EmbeddingField::Content),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmbeddingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note kept by a user, the source record of the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keep {
    pub id: String,
    pub title: String,
    pub content: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title_embedding: Option<Vec<f32>>,
    pub content_embedding: Option<Vec<f32>>,
}

impl Keep {
    pub fn embedding(&self, field: EmbeddingField) -> Option<&[f32]> {
        match field {
            EmbeddingField::Title => self.title_embedding.as_deref(),
            EmbeddingField::Content => self.content_embedding.as_deref(),
        }
    }

    /// Text the embedding for `field` is computed from.
    pub fn embedding_source(&self, field: EmbeddingField) -> &str {
        match field {
            EmbeddingField::Title => &self.title,
            EmbeddingField::Content => &self.content,
        }
    }

    pub fn missing_fields(&self, fields: &[EmbeddingField]) -> Vec<EmbeddingField> {
        fields
            .iter()
            .copied()
            .filter(|field| self.embedding(*field).is_none())
            .collect()
    }
}

/// Data needed to create a keep.
#[derive(Debug, Clone, Default)]
pub struct NewKeep {
    pub title: String,
    pub content: String,
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep() -> Keep {
        Keep {
            id: "k1".to_string(),
            title: "Groceries".to_string(),
            content: "milk, eggs".to_string(),
            labels: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            title_embedding: Some(vec![0.1, 0.2]),
            content_embedding: None,
        }
    }

    #[test]
    fn test_missing_fields() {
        let keep = keep();
        assert_eq!(
            keep.missing_fields(&EmbeddingField::ALL),
            vec![EmbeddingField::Content]
        );
        assert!(keep.missing_fields(&[EmbeddingField::Title]).is_empty());
    }

    #[test]
    fn test_field_parse_round_trips_names() {
        for field in EmbeddingField::ALL {
            assert_eq!(EmbeddingField::parse(field.as_str()), Some(field));
        }
        assert_eq!(EmbeddingField::parse("summary"), None);
    }
}

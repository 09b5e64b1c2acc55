//! Settings and mappings of a keeps index.

use crate::record_store::EmbeddingField;
use serde_json::{json, Map, Value as JsonValue};

pub const WORD_ANALYZER: &str = "cjk_word";
pub const NGRAM_ANALYZER: &str = "cjk_ngram";
pub const NGRAM_MIN: usize = 2;
pub const NGRAM_MAX: usize = 4;

/// Body of the create-index request.
///
/// Text fields are analyzed twice: word-level through the standard
/// tokenizer with CJK width folding, and through a 2-4 character n-gram
/// sub-field for partial matches inside unsegmented CJK text. Every
/// embeddable field gets a cosine `dense_vector` of `dimensions` length.
pub fn index_body(dimensions: usize) -> JsonValue {
    let text_field = json!({
        "type": "text",
        "analyzer": WORD_ANALYZER,
        "fields": {
            "ngram": {
                "type": "text",
                "analyzer": NGRAM_ANALYZER,
                "search_analyzer": WORD_ANALYZER
            }
        }
    });

    let mut properties = Map::new();
    properties.insert("id".to_string(), json!({ "type": "keyword" }));
    properties.insert("title".to_string(), text_field.clone());
    properties.insert("content".to_string(), text_field);
    properties.insert("labels".to_string(), json!({ "type": "keyword" }));
    properties.insert("created_at".to_string(), json!({ "type": "date" }));
    properties.insert("updated_at".to_string(), json!({ "type": "date" }));
    for field in EmbeddingField::ALL {
        properties.insert(
            field.document_field().to_string(),
            json!({
                "type": "dense_vector",
                "dims": dimensions,
                "index": true,
                "similarity": "cosine"
            }),
        );
    }

    json!({
        "settings": {
            "index": {
                "max_ngram_diff": NGRAM_MAX - NGRAM_MIN
            },
            "analysis": {
                "tokenizer": {
                    "cjk_ngram_tokenizer": {
                        "type": "ngram",
                        "min_gram": NGRAM_MIN,
                        "max_gram": NGRAM_MAX,
                        "token_chars": ["letter", "digit"]
                    }
                },
                "analyzer": {
                    WORD_ANALYZER: {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["cjk_width", "lowercase"]
                    },
                    NGRAM_ANALYZER: {
                        "type": "custom",
                        "tokenizer": "cjk_ngram_tokenizer",
                        "filter": ["cjk_width", "lowercase"]
                    }
                }
            }
        },
        "mappings": {
            "properties": properties
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_fields_use_dimensions() {
        let body = index_body(384);
        for field in EmbeddingField::ALL {
            let mapping = &body["mappings"]["properties"][field.document_field()];
            assert_eq!(mapping["type"], "dense_vector");
            assert_eq!(mapping["dims"], 384);
            assert_eq!(mapping["similarity"], "cosine");
        }
    }

    #[test]
    fn test_ngram_bounds() {
        let body = index_body(1024);
        let tokenizer = &body["settings"]["analysis"]["tokenizer"]["cjk_ngram_tokenizer"];
        assert_eq!(tokenizer["min_gram"], 2);
        assert_eq!(tokenizer["max_gram"], 4);
        assert_eq!(body["settings"]["index"]["max_ngram_diff"], 2);
    }

    #[test]
    fn test_text_fields_have_both_analyzers() {
        let body = index_body(1024);
        for field in ["title", "content"] {
            let mapping = &body["mappings"]["properties"][field];
            assert_eq!(mapping["analyzer"], WORD_ANALYZER);
            assert_eq!(mapping["fields"]["ngram"]["analyzer"], NGRAM_ANALYZER);
        }
        let analyzers = &body["settings"]["analysis"]["analyzer"];
        assert!(analyzers.get(WORD_ANALYZER).is_some());
        assert!(analyzers.get(NGRAM_ANALYZER).is_some());
    }
}

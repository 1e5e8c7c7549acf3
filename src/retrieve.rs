//! Retrieval: similarity search over an indexed repository.
//!
//! Thin layer over the vector store: embeds the query with the same
//! provider used at indexing time, scopes the search to the
//! repository namespace, and optionally narrows by node kind or
//! excludes files.

use serde_json::Value;
use tracing::debug;

use crate::embed::Embedder;
use crate::error::IndexError;
use crate::graph::ids;
use crate::store::{SearchFilters, SearchHit, VectorStore};

pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    store: &'a VectorStore,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, store: &'a VectorStore) -> Self {
        Self { embedder, store }
    }

    /// Top-K similarity search scoped to `repo_id`. An unconfigured
    /// store, or a provider yielding no query vector, returns an
    /// empty result set.
    pub async fn search(
        &self,
        query: &str,
        repo_id: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let vector = self.embedder.embed_query(query).await?;
        if vector.is_empty() {
            debug!("Query produced no embedding, returning empty result set");
            return Ok(Vec::new());
        }

        let namespace = ids::namespace_for(repo_id);
        let hits = self
            .store
            .search(&namespace, vector, top_k, filters)
            .await?;
        Ok(hits)
    }
}

/// Structured view of a metadata-rich record whose stored text is a
/// JSON document with encoded sub-fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichRecord {
    pub summary: String,
    pub symbols: Vec<String>,
    pub dependencies: Vec<String>,
    pub tokens_used: Option<u64>,
}

impl RichRecord {
    /// Decode a hit's stored text. Missing or malformed sub-fields
    /// decode to their defaults; only a non-JSON body is an error.
    pub fn decode(hit: &SearchHit) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(&hit.code)?;
        Ok(Self {
            summary: value
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            symbols: decode_list(value.get("symbols")),
            dependencies: decode_list(value.get("dependencies")),
            tokens_used: decode_count(value.get("tokens_used")),
        })
    }
}

/// A list field may be a JSON array or a JSON-encoded string of one.
fn decode_list(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn decode_count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::graph::NodeKind;

    fn hit_with_code(code: &str) -> SearchHit {
        SearchHit {
            id: "a".to_string(),
            score: 1.0,
            path: "a.json".to_string(),
            name: "a".to_string(),
            language: None,
            kind: Some(NodeKind::Chunk),
            start_line: 1,
            end_line: 1,
            code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_store_returns_empty() {
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::disabled();
        let retriever = Retriever::new(&embedder, &store);

        let hits = retriever
            .search("parse config", "demo", 5, &SearchFilters::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_decode_rich_record() {
        let hit = hit_with_code(
            r#"{"summary":"auth module","symbols":["login","logout"],"dependencies":"[\"serde\"]","tokens_used":128}"#,
        );
        let record = RichRecord::decode(&hit).unwrap();
        assert_eq!(record.summary, "auth module");
        assert_eq!(record.symbols, vec!["login", "logout"]);
        assert_eq!(record.dependencies, vec!["serde"]);
        assert_eq!(record.tokens_used, Some(128));
    }

    #[test]
    fn test_decode_missing_fields_default() {
        let record = RichRecord::decode(&hit_with_code("{}")).unwrap();
        assert_eq!(record, RichRecord::default());

        let record =
            RichRecord::decode(&hit_with_code(r#"{"tokens_used":"512"}"#)).unwrap();
        assert_eq!(record.tokens_used, Some(512));
    }

    #[test]
    fn test_decode_non_json_is_error() {
        assert!(RichRecord::decode(&hit_with_code("fn main() {}")).is_err());
    }
}

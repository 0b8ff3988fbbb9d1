//! Retrieval-index ports and adapters.
//!
//! One logical corpus is served by a dense `VectorIndex` and an optional
//! sparse `KeywordIndex` built from the same documents. Both return nodes in
//! the single contract the core depends on: `{id, text, metadata, score}`.

pub mod memory;
pub mod text;

pub use memory::MemoryVectorIndex;
pub use text::TantivyKeywordIndex;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::RetrievedNode;

/// A document handed to an index for (re-)ingestion. Upserting a document
/// with an existing id replaces the previous entry.
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl IndexDocument {
    /// Document with a freshly minted id, for corpora where the caller has
    /// no natural identity (e.g. chunked statute text). Sections that must
    /// overwrite on re-ingestion construct their ids deterministically
    /// instead.
    pub fn with_random_id(text: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }
}

/// Exact-match metadata constraints applied to a retrieval call. The dense
/// arm applies these natively; the sparse arm may not support them, in which
/// case the hybrid retriever post-filters so both arms respect the same
/// constraint.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub filters: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            filters: vec![(key.into(), value.into())],
        }
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.filters
            .iter()
            .all(|(key, value)| metadata.get(key).map(String::as_str) == Some(value.as_str()))
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedNode>>;

    async fn upsert(&self, documents: Vec<IndexDocument>) -> Result<()>;

    async fn count(&self) -> usize;
}

#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedNode>>;

    async fn upsert(&self, documents: Vec<IndexDocument>) -> Result<()>;

    /// Number of indexable documents. A zero count means the sparse arm is
    /// skipped silently — an empty corpus is not a failure.
    fn doc_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_all_pairs() {
        let filter = MetadataFilter::equals("case_id", "12").and("summary_section", "facts");
        let mut metadata = HashMap::new();
        metadata.insert("case_id".to_string(), "12".to_string());
        metadata.insert("summary_section".to_string(), "facts".to_string());
        assert!(filter.matches(&metadata));

        metadata.insert("summary_section".to_string(), "issues".to_string());
        assert!(!filter.matches(&metadata));

        metadata.remove("summary_section");
        assert!(!filter.matches(&metadata));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.matches(&HashMap::new()));
    }

    #[test]
    fn random_document_ids_are_unique() {
        let a = IndexDocument::with_random_id("same text", HashMap::new());
        let b = IndexDocument::with_random_id("same text", HashMap::new());
        assert_ne!(a.id, b.id);
    }
}

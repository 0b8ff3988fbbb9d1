//! In-process dense index: cosine similarity over embedded documents.
//!
//! Used for the uploaded-case corpus, where sections are re-embedded whenever
//! a clarification patches the case summary, and as the reference adapter for
//! the `VectorIndex` port in tests. Query embeddings go through an LRU cache
//! so repeated questions against the same corpus skip the embedding call.

use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::{IndexDocument, MetadataFilter, VectorIndex};
use crate::embed::EmbeddingModel;
use crate::types::RetrievedNode;

const QUERY_CACHE_SIZE: usize = 256;

struct StoredDocument {
    id: String,
    text: String,
    metadata: HashMap<String, String>,
    vector: Vec<f32>,
}

pub struct MemoryVectorIndex {
    embedder: Arc<dyn EmbeddingModel>,
    documents: RwLock<Vec<StoredDocument>>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl MemoryVectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    async fn query_vector(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.lock().get(query) {
            return Ok(cached.clone());
        }
        let vector = self.embedder.embed_query(query).await?;
        self.query_cache
            .lock()
            .put(query.to_string(), vector.clone());
        Ok(vector)
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedNode>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.query_vector(query).await?;

        let documents = self.documents.read();
        let mut scored: Vec<RetrievedNode> = documents
            .iter()
            .filter(|doc| filter.map_or(true, |f| f.matches(&doc.metadata)))
            .map(|doc| RetrievedNode {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                score: Self::cosine(&query_vector, &doc.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn upsert(&self, documents: Vec<IndexDocument>) -> Result<()> {
        for document in documents {
            let vector = self.embedder.embed_document(&document.text).await?;
            let mut store = self.documents.write();
            match store.iter().position(|d| d.id == document.id) {
                Some(index) => {
                    let existing = &mut store[index];
                    existing.text = document.text;
                    existing.metadata = document.metadata;
                    existing.vector = vector;
                }
                None => store.push(StoredDocument {
                    id: document.id,
                    text: document.text,
                    metadata: document.metadata,
                    vector,
                }),
            }
        }
        Ok(())
    }

    async fn count(&self) -> usize {
        self.documents.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::HashEmbedder;

    fn doc(id: &str, text: &str, pairs: &[(&str, &str)]) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn search_ranks_overlapping_text_first() {
        let index = MemoryVectorIndex::new(Arc::new(HashEmbedder::new(64)));
        index
            .upsert(vec![
                doc("a", "superannuation split and asset pool valuation", &[]),
                doc("b", "parenting schedule for school pickup", &[]),
            ])
            .await
            .unwrap();

        let results = index
            .search("asset pool valuation", 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn filter_restricts_results() {
        let index = MemoryVectorIndex::new(Arc::new(HashEmbedder::new(64)));
        index
            .upsert(vec![
                doc("a", "orders about the family home", &[("case_id", "1")]),
                doc("b", "orders about the family home", &[("case_id", "2")]),
            ])
            .await
            .unwrap();

        let filter = MetadataFilter::equals("case_id", "2");
        let results = index
            .search("family home", 5, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let index = MemoryVectorIndex::new(Arc::new(HashEmbedder::new(64)));
        index
            .upsert(vec![doc("case-1-facts", "old text", &[])])
            .await
            .unwrap();
        index
            .upsert(vec![doc("case-1-facts", "new text entirely", &[])])
            .await
            .unwrap();

        assert_eq!(index.count().await, 1);
        let results = index.search("new text entirely", 1, None).await.unwrap();
        assert_eq!(results[0].text, "new text entirely");
    }
}

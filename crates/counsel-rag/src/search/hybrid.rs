//! Hybrid retrieval: dense vector search and sparse keyword search merged
//! over one logical corpus, with weighted min-max score fusion and optional
//! LLM re-ranking.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::index::{KeywordIndex, MetadataFilter, VectorIndex};
use crate::llm::CompletionProvider;
use crate::reranking::llm_rerank;
use crate::types::RetrievedNode;

pub struct HybridRetriever {
    corpus: &'static str,
    vector: Arc<dyn VectorIndex>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    llm: Option<Arc<dyn CompletionProvider>>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        corpus: &'static str,
        vector: Arc<dyn VectorIndex>,
        keyword: Option<Arc<dyn KeywordIndex>>,
        llm: Option<Arc<dyn CompletionProvider>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            corpus,
            vector,
            keyword,
            llm,
            config,
        }
    }

    /// Retrieve up to `limit` nodes for `query` (falls back to the configured
    /// per-arm top-k when `limit` is `None`).
    ///
    /// An empty result from both arms yields an empty vector — downstream
    /// treats that as "no answer possible", not as an error. A failing arm is
    /// skipped with a warning; degraded retrieval never aborts the request.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: Option<usize>,
        filter: Option<&MetadataFilter>,
        use_rerank: bool,
    ) -> Result<Vec<RetrievedNode>> {
        let vector_k = limit.unwrap_or(self.config.vector_top_k);
        let bm25_k = limit.unwrap_or(self.config.bm25_top_k);

        // Dense arm with native filter support; sparse arm with a manual
        // post-filter so both arms respect the same constraint. An unindexed
        // sparse corpus is skipped silently. Both arms run concurrently.
        let vector_arm = async {
            match self.vector.search(query, vector_k, filter).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    tracing::warn!(corpus = self.corpus, error = %e, "Vector arm failed; continuing without it");
                    Vec::new()
                }
            }
        };
        let keyword_arm = async {
            let Some(keyword) = &self.keyword else {
                return Vec::new();
            };
            if bm25_k == 0 || keyword.doc_count() == 0 {
                tracing::debug!(corpus = self.corpus, "Keyword arm skipped: no indexed documents");
                return Vec::new();
            }
            match keyword.search(query, bm25_k).await {
                Ok(mut nodes) => {
                    if let Some(filter) = filter {
                        nodes.retain(|n| filter.matches(&n.metadata));
                    }
                    nodes
                }
                Err(e) => {
                    tracing::warn!(corpus = self.corpus, error = %e, "Keyword arm failed; falling back to vector-only");
                    Vec::new()
                }
            }
        };
        let (vector_nodes, keyword_nodes) = futures::join!(vector_arm, keyword_arm);

        tracing::debug!(
            corpus = self.corpus,
            vector_hits = vector_nodes.len(),
            keyword_hits = keyword_nodes.len(),
            "Hybrid retrieval candidates"
        );

        let mut merged = if use_rerank && self.llm.is_some() {
            let mut nodes = merge_nodes(&vector_nodes, &keyword_nodes);
            if nodes.len() > 1 {
                if let Some(llm) = &self.llm {
                    nodes = llm_rerank(
                        llm.as_ref(),
                        query,
                        nodes,
                        self.config.rerank_timeout_secs,
                    )
                    .await;
                    // Replace fused scores with rank-derived relevance so
                    // downstream thresholds keep working on [0, 1].
                    let total = nodes.len() as f32;
                    for (position, node) in nodes.iter_mut().enumerate() {
                        node.score = (total - position as f32) / total;
                    }
                    nodes.truncate(self.config.rerank_top_n);
                }
            }
            nodes
        } else {
            fuse_weighted(
                &vector_nodes,
                &keyword_nodes,
                self.config.vector_weight,
                self.config.bm25_weight,
            )
        };

        if let Some(limit) = limit {
            merged.truncate(limit);
        }
        Ok(merged)
    }
}

/// Merge the two candidate lists by node identity. A node present in both
/// arms keeps one entry; insertion order (vector arm first) is the stable
/// tie-break order downstream relies on.
pub fn merge_nodes(
    vector_nodes: &[RetrievedNode],
    keyword_nodes: &[RetrievedNode],
) -> Vec<RetrievedNode> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(vector_nodes.len() + keyword_nodes.len());
    for node in vector_nodes.iter().chain(keyword_nodes.iter()) {
        if seen.insert(node.id.clone()) {
            merged.push(node.clone());
        }
    }
    merged
}

/// Min-max normalize one arm's raw scores over its candidate set. A
/// single-candidate or zero-variance set normalizes to 1.0 for all members.
pub fn normalize_scores(nodes: &[RetrievedNode]) -> HashMap<String, f32> {
    if nodes.is_empty() {
        return HashMap::new();
    }
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for node in nodes {
        min = min.min(node.score);
        max = max.max(node.score);
    }
    if (max - min).abs() <= f32::EPSILON {
        return nodes.iter().map(|n| (n.id.clone(), 1.0)).collect();
    }
    let range = max - min;
    nodes
        .iter()
        .map(|n| (n.id.clone(), (n.score - min) / range))
        .collect()
}

/// Weighted fusion: normalize each arm independently, then combine as
/// `score = w_vector * norm_vector + w_bm25 * norm_bm25`. A node absent from
/// one arm contributes zero from that arm. Sorted descending; ties keep merge
/// order (stable sort).
pub fn fuse_weighted(
    vector_nodes: &[RetrievedNode],
    keyword_nodes: &[RetrievedNode],
    vector_weight: f32,
    bm25_weight: f32,
) -> Vec<RetrievedNode> {
    let vector_norm = normalize_scores(vector_nodes);
    let keyword_norm = normalize_scores(keyword_nodes);

    let mut merged = merge_nodes(vector_nodes, keyword_nodes);
    for node in &mut merged {
        node.score = vector_weight * vector_norm.get(&node.id).copied().unwrap_or(0.0)
            + bm25_weight * keyword_norm.get(&node.id).copied().unwrap_or(0.0);
    }
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryVectorIndex;
    use crate::testutil::HashEmbedder;

    fn node(id: &str, score: f32) -> RetrievedNode {
        RetrievedNode {
            id: id.to_string(),
            text: format!("text {}", id),
            metadata: HashMap::new(),
            score,
        }
    }

    #[test]
    fn single_candidate_normalizes_to_one() {
        let nodes = vec![node("a", 0.37)];
        let normalized = normalize_scores(&nodes);
        assert_eq!(normalized["a"], 1.0);
    }

    #[test]
    fn equal_raw_scores_normalize_equally() {
        let nodes = vec![node("a", 0.8), node("b", 0.8), node("c", 0.8)];
        let normalized = normalize_scores(&nodes);
        assert_eq!(normalized["a"], 1.0);
        assert_eq!(normalized["b"], 1.0);
        assert_eq!(normalized["c"], 1.0);
    }

    #[test]
    fn merge_deduplicates_keeping_first_entry() {
        let vector = vec![node("a", 0.9), node("b", 0.5)];
        let keyword = vec![node("b", 3.0), node("c", 2.0)];
        let merged = merge_nodes(&vector, &keyword);
        let ids: Vec<&str> = merged.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn both_arms_beat_vector_only_at_comparable_strength() {
        // Five candidates per arm, weights 0.6/0.4. Node "both" appears in
        // both arms with top-normalized scores; node "vec_only" is vector-only
        // with the same normalized vector score. The bm25 term contributes
        // zero for "vec_only", so "both" must outrank it — verify the
        // arithmetic, not just the ordering.
        let vector = vec![
            node("both", 1.0),
            node("vec_only", 1.0),
            node("v3", 0.6),
            node("v4", 0.4),
            node("v5", 0.0),
        ];
        let keyword = vec![
            node("both", 9.0),
            node("k2", 5.0),
            node("k3", 4.0),
            node("k4", 2.0),
            node("k5", 1.0),
        ];

        let fused = fuse_weighted(&vector, &keyword, 0.6, 0.4);
        let by_id: HashMap<&str, f32> = fused.iter().map(|n| (n.id.as_str(), n.score)).collect();

        assert!((by_id["both"] - (0.6 * 1.0 + 0.4 * 1.0)).abs() < 1e-6);
        assert!((by_id["vec_only"] - 0.6).abs() < 1e-6);
        assert!(by_id["both"] > by_id["vec_only"]);
        assert_eq!(fused[0].id, "both");
    }

    #[test]
    fn empty_arms_fuse_to_empty() {
        let fused = fuse_weighted(&[], &[], 0.6, 0.4);
        assert!(fused.is_empty());
    }

    #[test]
    fn ties_keep_merge_order() {
        let vector = vec![node("first", 0.5), node("second", 0.5)];
        let fused = fuse_weighted(&vector, &[], 0.6, 0.4);
        assert_eq!(fused[0].id, "first");
        assert_eq!(fused[1].id, "second");
    }

    #[tokio::test]
    async fn retriever_returns_empty_when_corpus_is_empty() {
        let vector = Arc::new(MemoryVectorIndex::new(Arc::new(HashEmbedder::new(32))));
        let retriever = HybridRetriever::new(
            "test",
            vector,
            None,
            None,
            RetrievalConfig::default(),
        );
        let nodes = retriever.retrieve("anything", Some(3), None, false).await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn retriever_post_filters_keyword_arm() {
        use crate::index::{IndexDocument, KeywordIndex, TantivyKeywordIndex};

        let vector = Arc::new(MemoryVectorIndex::new(Arc::new(HashEmbedder::new(32))));
        let keyword = Arc::new(TantivyKeywordIndex::in_memory().unwrap());
        keyword
            .upsert(vec![
                IndexDocument {
                    id: "k1".to_string(),
                    text: "property settlement orders".to_string(),
                    metadata: HashMap::from([("case_id".to_string(), "1".to_string())]),
                },
                IndexDocument {
                    id: "k2".to_string(),
                    text: "property settlement orders".to_string(),
                    metadata: HashMap::from([("case_id".to_string(), "2".to_string())]),
                },
            ])
            .await
            .unwrap();

        let retriever = HybridRetriever::new(
            "test",
            vector,
            Some(keyword),
            None,
            RetrievalConfig::default(),
        );
        let filter = MetadataFilter::equals("case_id", "2");
        let nodes = retriever
            .retrieve("property settlement", Some(5), Some(&filter), false)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "k2");
    }
}

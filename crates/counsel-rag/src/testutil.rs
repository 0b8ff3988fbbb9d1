//! Shared mocks for in-crate tests: a prompt-keyed completion provider, a
//! failing provider, and a deterministic bag-of-words embedder.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::embed::EmbeddingModel;
use crate::llm::CompletionProvider;

/// Completion provider that answers by matching a substring of the prompt
/// against registered rules. Unmatched prompts return an empty string, which
/// every caller treats as a degraded (but non-failing) response.
pub struct KeyedCompletion {
    rules: Vec<(String, String)>,
}

impl KeyedCompletion {
    pub fn new(rules: Vec<(&str, &str)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl CompletionProvider for KeyedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        for (key, value) in &self.rules {
            if prompt.contains(key.as_str()) {
                return Ok(value.clone());
            }
        }
        Ok(String::new())
    }
}

/// Completion provider whose every call fails.
pub struct FailingCompletion;

#[async_trait]
impl CompletionProvider for FailingCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("completion service unavailable"))
    }
}

/// Deterministic bag-of-words embedder: each token hashes into one bucket,
/// the vector is L2-normalized. Texts sharing tokens get similar vectors,
/// which is all the retrieval tests need.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

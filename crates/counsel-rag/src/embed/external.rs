//! External embeddings API adapter (OpenAI-style `/v1/embeddings`).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::EmbeddingModel;

pub struct ExternalEmbedder {
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl ExternalEmbedder {
    pub fn new(endpoint: String, api_key: String, model: String, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            endpoint,
            api_key,
            model,
            dimension,
            client,
        })
    }

    pub fn openai(api_key: String, model: String, dimension: usize) -> Result<Self> {
        Self::new(
            "https://api.openai.com/v1/embeddings".to_string(),
            api_key,
            model,
            dimension,
        )
    }
}

#[async_trait]
impl EmbeddingModel for ExternalEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Embedding request to {} failed: {}", self.endpoint, e))?;

        let status = response.status();
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse embedding response (HTTP {}): {}", status, e))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| anyhow!("Embedding response from {} was empty", self.endpoint))?;

        if embedding.len() != self.dimension {
            return Err(anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            ));
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

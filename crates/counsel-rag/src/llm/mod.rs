//! Completion-service port.
//!
//! The core depends on exactly one result contract — a prompt string in,
//! plain text out — and an adapter layer translates whatever the underlying
//! provider returns into that contract.

pub mod external;

pub use external::{ApiProvider, ExternalProvider};

use anyhow::Result;
use async_trait::async_trait;

/// Generation parameters for a single completion call.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Single-shot completion: prompt in, text out.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Completion with explicit generation parameters. Defaults to the
    /// single-shot call for providers without tunable parameters.
    async fn complete_with(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.complete(prompt).await
    }
}

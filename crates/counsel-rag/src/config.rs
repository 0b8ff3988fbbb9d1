use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub retrieval: RetrievalConfig,
    pub clarify: ClarifyConfig,
    pub history: HistoryConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub vector_top_k: usize,
    pub bm25_top_k: usize,
    pub vector_weight: f32,
    pub bm25_weight: f32,
    /// Rerank toggle for the general Q&A path. The context assembler passes
    /// its own per-stage flags regardless of this setting.
    pub use_rerank: bool,
    pub rerank_top_n: usize,
    pub rerank_timeout_secs: u64,
    pub min_relevance_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClarifyConfig {
    pub max_questions: usize,
    /// Clarification answers longer than this many words are condensed
    /// before being written into the case summary.
    pub answer_word_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub target_words: usize,
    pub max_words: usize,
    pub raw_excerpt_chars: usize,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    ///
    /// The fusion weights are intentionally NOT required to sum to 1: the
    /// fused score is an unweighted sum of the two weighted components, and
    /// downstream only thresholds against it.
    pub fn validate(&self) -> Result<(), String> {
        if self.retrieval.vector_top_k == 0 {
            return Err("retrieval.vector_top_k must be > 0".into());
        }
        if self.retrieval.vector_weight < 0.0 || self.retrieval.bm25_weight < 0.0 {
            return Err("retrieval weights must be non-negative".into());
        }
        if self.retrieval.vector_weight == 0.0 && self.retrieval.bm25_weight == 0.0 {
            return Err("at least one retrieval weight must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_relevance_score) {
            return Err("retrieval.min_relevance_score must be in [0.0, 1.0]".into());
        }
        if self.clarify.max_questions == 0 {
            return Err("clarify.max_questions must be > 0".into());
        }
        if self.clarify.answer_word_cap == 0 {
            return Err("clarify.answer_word_cap must be > 0".into());
        }
        if self.summary.max_words < self.summary.target_words {
            return Err("summary.max_words must be >= summary.target_words".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing
    /// fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("counsel-rag");

        Self {
            data_dir,
            retrieval: RetrievalConfig::default(),
            clarify: ClarifyConfig::default(),
            history: HistoryConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 5,
            bm25_top_k: 5,
            vector_weight: 0.6,
            bm25_weight: 0.4,
            use_rerank: false,
            rerank_top_n: 8,
            rerank_timeout_secs: 20,
            min_relevance_score: 0.5,
        }
    }
}

impl Default for ClarifyConfig {
    fn default() -> Self {
        Self {
            max_questions: 5,
            answer_word_cap: 50,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_turns: 8 }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            target_words: 1000,
            max_words: 1200,
            raw_excerpt_chars: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_weights() {
        let mut config = EngineConfig::default();
        config.retrieval.vector_weight = 0.0;
        config.retrieval.bm25_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn weights_need_not_sum_to_one() {
        let mut config = EngineConfig::default();
        config.retrieval.vector_weight = 0.9;
        config.retrieval.bm25_weight = 0.9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"retrieval": {"vector_top_k": 7}}"#).unwrap();
        assert_eq!(config.retrieval.vector_top_k, 7);
        assert_eq!(config.retrieval.bm25_top_k, 5);
        assert_eq!(config.clarify.max_questions, 5);
    }
}

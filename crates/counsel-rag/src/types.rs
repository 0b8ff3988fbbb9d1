use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node returned by a retrieval call. Ephemeral: it lives for one request
/// and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedNode {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    /// Fused relevance score in [0, 1] after normalization/fusion.
    pub score: f32,
}

impl RetrievedNode {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Legislation,
    #[serde(rename = "Case Law")]
    CaseLaw,
}

/// A structured reference attached to a generated answer. Derived from
/// retrieved nodes at answer time; returned to the caller, not cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub kind: SourceKind,
    pub reference: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationPayload {
    pub questions: Vec<String>,
    pub missing_fields: Vec<String>,
    pub message: String,
}

/// Result of the classify-and-answer-or-clarify operation: either the answer
/// itself, or the questions the caller must answer first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AskOutcome {
    Answer(AnswerPayload),
    Clarification(ClarificationPayload),
}

/// Compound key for all per-case state. Keyed first by user so one user's
/// state is isolable from another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseKey {
    pub user_id: i64,
    pub case_id: i64,
}

impl CaseKey {
    pub fn new(user_id: i64, case_id: i64) -> Self {
        Self { user_id, case_id }
    }
}

// Metadata keys shared between ingestion and retrieval.
pub const META_CASE_ID: &str = "case_id";
pub const META_CASE_NAME: &str = "case_name";
pub const META_SECTION_ID: &str = "section_id";
pub const META_SECTION_TITLE: &str = "section_title";
pub const META_SUMMARY_SECTION: &str = "summary_section";
pub const META_SOURCE: &str = "source";
pub const META_SOURCE_TYPE: &str = "source_type";
pub const META_IMPACT: &str = "impact_analysis";
pub const META_REASONS: &str = "reasons_rationale";
pub const META_OUTCOME: &str = "outcome_orders";

//! Context assembly: the triple-thread retrieval over statutes, prior-case
//! strategic summaries and full judgments, plus the citation list built in
//! parallel with the prompt.
//!
//! Every retrieval stage degrades to an empty context block rather than
//! aborting — the model is instructed to say when information is
//! insufficient, and the assembler never synthesizes missing facts itself.
//! Only the final completion call is allowed to fail.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;

use crate::index::MetadataFilter;
use crate::llm::CompletionProvider;
use crate::observe::TraceSink;
use crate::search::HybridRetriever;
use crate::templates::{self, AnswerPromptInputs, CACHE_SUMMARY_SEPARATOR, SUMMARY_NOT_AVAILABLE};
use crate::topics::{search_keywords, Topic};
use crate::types::{
    Citation, RetrievedNode, SourceKind, META_CASE_ID, META_CASE_NAME, META_IMPACT, META_OUTCOME,
    META_REASONS, META_SECTION_ID, META_SECTION_TITLE, META_SUMMARY_SECTION,
};

const STATUTE_LIMIT: usize = 3;
const SUMMARY_LIMIT: usize = 2;
const JUDGMENT_LIMIT: usize = 2;
const CASE_CONTEXT_EXCERPT_CHARS: usize = 300;
const HISTORY_EXCERPT_CHARS: usize = 200;
const MAX_QUERY_TAGS: usize = 8;

pub struct AssembledAnswer {
    pub answer: String,
    pub cache_summary: String,
    pub citations: Vec<Citation>,
}

pub struct ContextAssembler {
    statutes: HybridRetriever,
    case_summaries: HybridRetriever,
    judgments: HybridRetriever,
    llm: Arc<dyn CompletionProvider>,
    sink: Arc<dyn TraceSink>,
}

impl ContextAssembler {
    pub fn new(
        statutes: HybridRetriever,
        case_summaries: HybridRetriever,
        judgments: HybridRetriever,
        llm: Arc<dyn CompletionProvider>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            statutes,
            case_summaries,
            judgments,
            llm,
            sink,
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        case_section_text: &str,
        history_text: &str,
        topic: Topic,
        impact_analysis: &str,
    ) -> Result<AssembledAnswer> {
        // 1. Statutes: the legal foundation.
        let topic_prefix = if topic == Topic::Other { "" } else { topic.as_str() };
        let statute_query = format!("{} {}", topic_prefix, question);
        let statute_nodes = self
            .retrieve_degraded(&self.statutes, statute_query.trim(), STATUTE_LIMIT, None, true)
            .await;
        let statute_context = statute_nodes
            .iter()
            .map(|n| format!("- {}", n.text))
            .collect::<Vec<_>>()
            .join("\n");

        // 2. Prior-case strategic summaries, pinned to the topic's section
        //    when a topic is known.
        let summary_filter = (topic != Topic::Other)
            .then(|| MetadataFilter::equals(META_SUMMARY_SECTION, topic.as_str()));
        let summary_query =
            build_structured_query(question, case_section_text, history_text, topic);
        let summary_nodes = self
            .retrieve_degraded(
                &self.case_summaries,
                &summary_query,
                SUMMARY_LIMIT,
                summary_filter.as_ref(),
                true,
            )
            .await;

        let mut citations: Vec<Citation> = statute_nodes
            .iter()
            .map(|node| Citation {
                source: node
                    .meta(META_SECTION_TITLE)
                    .unwrap_or("Family Law Act 1975")
                    .to_string(),
                kind: SourceKind::Legislation,
                reference: node.meta(META_SECTION_ID).map(str::to_string),
                url: None,
            })
            .collect();

        // 3. Deep precedent: full-judgment passages pulled per summary node,
        //    filtered to that exact case so facts from unrelated judgments
        //    never mix.
        let mut precedent_blocks = Vec::with_capacity(summary_nodes.len());
        for summary_node in &summary_nodes {
            let case_id = summary_node.meta(META_CASE_ID).unwrap_or_default().to_string();
            let detail_nodes = if case_id.is_empty() {
                Vec::new()
            } else {
                let case_filter = MetadataFilter::equals(META_CASE_ID, case_id.clone());
                self.retrieve_degraded(
                    &self.judgments,
                    question,
                    JUDGMENT_LIMIT,
                    Some(&case_filter),
                    false,
                )
                .await
            };

            precedent_blocks.push(precedent_block(summary_node, &detail_nodes));
            citations.push(Citation {
                source: summary_node
                    .meta(META_CASE_NAME)
                    .unwrap_or("Unnamed case")
                    .to_string(),
                kind: SourceKind::CaseLaw,
                reference: Some(case_id.clone()),
                url: Some(format!(
                    "https://www.austlii.edu.au/cgi-bin/viewdoc/au/cases/cth/FedCFamC1F/{}.html",
                    case_id
                )),
            });
        }

        self.sink.event(
            "assemble",
            "retrieval",
            json!({
                "statutes": statute_nodes.len(),
                "summaries": summary_nodes.len(),
                "precedent_blocks": precedent_blocks.len(),
            }),
        );

        // 4-6. One synthesis call with a fixed output contract, split on the
        //      separator. A missing separator never blocks the answer.
        let prompt = templates::answer_prompt(&AnswerPromptInputs {
            question,
            statute_context: &statute_context,
            case_section_text,
            impact_analysis,
            history_text,
            precedent_context: &precedent_blocks.join("\n\n---\n\n"),
            topic,
        });

        let response = self
            .llm
            .complete(&prompt)
            .await
            .context("final answer synthesis")?;
        let (answer, cache_summary) = split_cache_summary(&response);

        Ok(AssembledAnswer {
            answer,
            cache_summary,
            citations,
        })
    }

    async fn retrieve_degraded(
        &self,
        retriever: &HybridRetriever,
        query: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
        use_rerank: bool,
    ) -> Vec<RetrievedNode> {
        match retriever.retrieve(query, Some(limit), filter, use_rerank).await {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval stage failed; continuing with empty context");
                Vec::new()
            }
        }
    }
}

fn precedent_block(summary_node: &RetrievedNode, detail_nodes: &[RetrievedNode]) -> String {
    let impact = summary_node
        .meta(META_IMPACT)
        .unwrap_or("No strategic impact recorded.");
    let reasons = summary_node
        .meta(META_REASONS)
        .unwrap_or("No detailed reasoning available.");
    let outcome = summary_node
        .meta(META_OUTCOME)
        .unwrap_or("No specific orders reported.");
    let detail_text = detail_nodes
        .iter()
        .map(|n| n.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "CASE: {}\nSTRATEGIC IMPACT: {}\nREASONS & RATIONALE: {}\nOUTCOME/ORDERS: {}\nFULL TEXT SNIPPET: {}",
        summary_node.meta(META_CASE_NAME).unwrap_or("Unnamed case"),
        impact,
        reasons,
        outcome,
        detail_text,
    )
}

/// Build the structured retrieval query: topic header, the legal-term tags
/// that overlap the question, the question itself, and bounded excerpts of
/// the case context and history.
pub fn build_structured_query(
    question: &str,
    case_section_text: &str,
    history_text: &str,
    topic: Topic,
) -> String {
    let mut components = vec![format!("[{}]", topic.label())];

    let question_lower = question.to_lowercase();
    let tags: Vec<&str> = search_keywords(topic)
        .iter()
        .filter(|keyword| {
            keyword
                .to_lowercase()
                .split_whitespace()
                .any(|word| question_lower.contains(word))
        })
        .take(MAX_QUERY_TAGS)
        .copied()
        .collect();
    if !tags.is_empty() {
        components.push(format!("Legal terms: {}", tags.join(", ")));
    }

    components.push(format!("Question: {}", question));

    if !case_section_text.is_empty() {
        components.push(format!(
            "Case context: {}",
            bounded_excerpt(case_section_text, CASE_CONTEXT_EXCERPT_CHARS)
        ));
    }
    if !history_text.is_empty() {
        components.push(format!(
            "History: {}",
            bounded_excerpt(history_text, HISTORY_EXCERPT_CHARS)
        ));
    }

    components.join("\n")
}

/// Split a synthesis response on the cache-summary separator. The portion
/// before it is the user-visible answer; the portion after feeds history.
pub fn split_cache_summary(response: &str) -> (String, String) {
    match response.split_once(CACHE_SUMMARY_SEPARATOR) {
        Some((answer, summary)) => {
            let summary = summary.trim();
            (
                answer.trim().to_string(),
                if summary.is_empty() {
                    SUMMARY_NOT_AVAILABLE.to_string()
                } else {
                    summary.to_string()
                },
            )
        }
        None => (response.trim().to_string(), SUMMARY_NOT_AVAILABLE.to_string()),
    }
}

fn bounded_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn split_handles_present_and_missing_separator() {
        let (answer, summary) =
            split_cache_summary("The answer.\n---CACHE_SUMMARY---\nCondensed advice.");
        assert_eq!(answer, "The answer.");
        assert_eq!(summary, "Condensed advice.");

        let (answer, summary) = split_cache_summary("Just an answer, no separator.");
        assert_eq!(answer, "Just an answer, no separator.");
        assert_eq!(summary, SUMMARY_NOT_AVAILABLE);

        let (answer, summary) = split_cache_summary("Answer.\n---CACHE_SUMMARY---\n   ");
        assert_eq!(answer, "Answer.");
        assert_eq!(summary, SUMMARY_NOT_AVAILABLE);
    }

    #[test]
    fn structured_query_tags_overlap_with_question() {
        let query = build_structured_query(
            "What happens to the superannuation and the asset pool?",
            "",
            "",
            Topic::PropertyDivision,
        );
        assert!(query.starts_with("[Property Division]"));
        assert!(query.contains("superannuation"));
        assert!(query.contains("asset pool"));
        assert!(query.contains("Question: What happens"));
    }

    #[test]
    fn structured_query_bounds_context_excerpts() {
        let long_context = "x".repeat(500);
        let query = build_structured_query("question", &long_context, "", Topic::Other);
        let context_line = query
            .lines()
            .find(|line| line.starts_with("Case context:"))
            .unwrap();
        assert!(context_line.len() < 330);
        assert!(context_line.ends_with("..."));
    }

    #[test]
    fn precedent_block_uses_fallback_labels() {
        let node = RetrievedNode {
            id: "s1".to_string(),
            text: "summary text".to_string(),
            metadata: HashMap::from([(META_CASE_NAME.to_string(), "Smith & Smith".to_string())]),
            score: 1.0,
        };
        let block = precedent_block(&node, &[]);
        assert!(block.contains("CASE: Smith & Smith"));
        assert!(block.contains("No strategic impact recorded."));
        assert!(block.contains("No specific orders reported."));
    }
}

//! The clarification state machine.
//!
//! Two states per (user, case): no pending clarification, or exactly one.
//! Opening stores the original question plus the detected gap; submission
//! consumes the pending entry atomically, condenses over-length answers,
//! patches the structured case summary (append, never overwrite), rebuilds
//! the cached section text, and re-embeds the updated topic before the
//! caller resumes the original question. That mutation order is what lets
//! the resumed answer read the patched section map.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::cache::{PendingClarification, PendingStore, SectionCache};
use crate::error::EngineError;
use crate::detect::MissingFactors;
use crate::index::{IndexDocument, VectorIndex};
use crate::llm::CompletionProvider;
use crate::observe::TraceSink;
use crate::store::CaseStore;
use crate::summary::{parse_summary, serialize_summary};
use crate::templates;
use crate::topics::{factors, Topic};
use crate::types::{CaseKey, ClarificationPayload, META_CASE_ID, META_SOURCE_TYPE, META_SUMMARY_SECTION};

pub struct ClarificationFlow {
    llm: Arc<dyn CompletionProvider>,
    store: Arc<dyn CaseStore>,
    sections: SectionCache,
    pending: PendingStore,
    uploaded_index: Arc<dyn VectorIndex>,
    answer_word_cap: usize,
    sink: Arc<dyn TraceSink>,
}

impl ClarificationFlow {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        store: Arc<dyn CaseStore>,
        sections: SectionCache,
        pending: PendingStore,
        uploaded_index: Arc<dyn VectorIndex>,
        answer_word_cap: usize,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            llm,
            store,
            sections,
            pending,
            uploaded_index,
            answer_word_cap,
            sink,
        }
    }

    /// Transition `no_pending -> pending`: store the gap and hand the caller
    /// the questions. The caller must not receive an answer this turn.
    pub fn open(
        &self,
        key: CaseKey,
        question: &str,
        topic: Topic,
        missing: MissingFactors,
    ) -> ClarificationPayload {
        tracing::info!(
            case_id = key.case_id,
            topic = %topic,
            missing = missing.fields.len(),
            "Clarification needed; parking question"
        );
        let payload = ClarificationPayload {
            questions: missing.questions.clone(),
            missing_fields: missing.fields.clone(),
            message: "I need a bit more information to give you a complete answer. Please answer the following questions:".to_string(),
        };
        self.pending.put(
            key,
            PendingClarification {
                question: question.to_string(),
                topic,
                missing_fields: missing.fields,
                questions: missing.questions,
            },
        );
        self.sink.event(
            "clarify",
            "pending_opened",
            json!({"case_id": key.case_id, "topic": topic.as_str()}),
        );
        payload
    }

    /// Transition `pending -> no_pending`: consume the pending entry and
    /// fold the answers into the case summary. Returns the consumed entry so
    /// the caller can resume the original question against the patched
    /// section map.
    ///
    /// The pending entry is removed before any processing — submission
    /// consumes it regardless of whether the patch succeeds.
    pub async fn submit(
        &self,
        key: CaseKey,
        answers: &HashMap<String, String>,
    ) -> Result<PendingClarification, EngineError> {
        let pending = self
            .pending
            .take(key)
            .ok_or(EngineError::NoPendingClarification(key.case_id))?;

        // a. Condense each declared factor's answer (missing answers default
        //    to empty and are skipped downstream).
        let mut condensed: Vec<(String, String)> = Vec::with_capacity(pending.missing_fields.len());
        for field in &pending.missing_fields {
            let raw = answers.get(field).map(String::as_str).unwrap_or("");
            let value = self.condense_answer(raw).await;
            condensed.push((field.clone(), value));
        }

        // b + c. Append into the summary document and persist it as the new
        //        source of truth.
        let stored = self
            .store
            .load_summary(key.case_id)
            .await
            .map_err(EngineError::Store)?
            .unwrap_or_else(|| "{}".to_string());
        let mut summary = parse_summary(&stored);

        for (field, value) in &condensed {
            if value.is_empty() {
                continue;
            }
            if !summary.append_factor(pending.topic, field, value) {
                tracing::warn!(field = %field, topic = %pending.topic, "Unknown clarification field; skipping");
            }
        }
        self.store
            .save_summary(key.case_id, &serialize_summary(&summary))
            .await
            .map_err(EngineError::Store)?;

        // d. Rebuild the cached section text: "label: value" lines appended
        //    to whatever was cached before.
        let label_for = |field: &str| -> String {
            factors(pending.topic)
                .iter()
                .find(|f| f.id == field)
                .map(|f| f.label.to_string())
                .unwrap_or_else(|| field.replace('_', " "))
        };
        let patch_lines: Vec<String> = condensed
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(field, value)| format!("- {}: {}", title_case(&label_for(field)), value))
            .collect();
        let patch_text = patch_lines.join("\n");
        if !patch_text.is_empty() {
            self.sections.append(key, pending.topic.as_str(), &patch_text);
        }

        // e. Re-embed the updated topic's text, overwriting the previous
        //    embedding for this (case, topic) pair.
        let section_text = self
            .sections
            .get(key, pending.topic.as_str())
            .unwrap_or_else(|| patch_text.clone());
        if !section_text.is_empty() {
            let document = IndexDocument {
                id: format!("case-{}-{}", key.case_id, pending.topic.as_str()),
                text: section_text,
                metadata: HashMap::from([
                    (META_SOURCE_TYPE.to_string(), "uploaded_case".to_string()),
                    (META_CASE_ID.to_string(), key.case_id.to_string()),
                    (META_SUMMARY_SECTION.to_string(), pending.topic.as_str().to_string()),
                ]),
            };
            if let Err(e) = self.uploaded_index.upsert(vec![document]).await {
                tracing::warn!(error = %e, "Re-embedding patched section failed; cache and store are already updated");
            }
        }

        self.sink.event(
            "clarify",
            "pending_consumed",
            json!({
                "case_id": key.case_id,
                "topic": pending.topic.as_str(),
                "fields": pending.missing_fields,
            }),
        );

        Ok(pending)
    }

    /// Condense one answer: pass short answers through, summarize over-length
    /// ones with a single completion call, and fall back to word truncation
    /// when that call fails — a degraded answer must never block the
    /// transition.
    async fn condense_answer(&self, raw: &str) -> String {
        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return String::new();
        }
        if cleaned.split_whitespace().count() <= self.answer_word_cap {
            return cleaned.to_string();
        }

        let prompt = templates::field_summary_prompt(cleaned, self.answer_word_cap);
        match self.llm.complete(&prompt).await {
            Ok(response) => {
                let trimmed = response.trim();
                if trimmed.is_empty() {
                    truncate_words(cleaned, self.answer_word_cap)
                } else {
                    trimmed.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Answer summarization failed; truncating instead");
                truncate_words(cleaned, self.answer_word_cap)
            }
        }
    }
}

/// Naive fallback condensation: the first `max_words` words plus an ellipsis
/// marker.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.trim().to_string();
    }
    let mut truncated = words[..max_words].join(" ");
    truncated.push('…');
    truncated
}

fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{PendingStore, SectionCache};
    use crate::detect::detect_missing;
    use crate::index::MemoryVectorIndex;
    use crate::observe::NoopSink;
    use crate::store::MemoryCaseStore;
    use crate::testutil::{FailingCompletion, HashEmbedder, KeyedCompletion};

    const KEY: CaseKey = CaseKey { user_id: 1, case_id: 6 };

    fn flow(llm: Arc<dyn CompletionProvider>, store: Arc<MemoryCaseStore>) -> ClarificationFlow {
        ClarificationFlow::new(
            llm,
            store,
            SectionCache::new(),
            PendingStore::new(),
            Arc::new(MemoryVectorIndex::new(Arc::new(HashEmbedder::new(32)))),
            50,
            Arc::new(NoopSink),
        )
    }

    #[test]
    fn truncate_words_adds_ellipsis_only_when_needed() {
        assert_eq!(truncate_words("short answer", 50), "short answer");
        let long = "word ".repeat(60);
        let truncated = truncate_words(&long, 50);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncated.split_whitespace().count(), 50);
    }

    #[tokio::test]
    async fn submit_without_pending_is_a_client_error() {
        let store = Arc::new(MemoryCaseStore::new().with_case(6, "{}"));
        let flow = flow(Arc::new(FailingCompletion), store);
        let result = flow.submit(KEY, &HashMap::new()).await;
        assert!(matches!(result, Err(EngineError::NoPendingClarification(6))));
    }

    #[tokio::test]
    async fn submit_patches_summary_and_section_cache() {
        let store = Arc::new(MemoryCaseStore::new().with_case(6, "{}"));
        let llm: Arc<dyn CompletionProvider> = Arc::new(KeyedCompletion::new(vec![]));
        let flow = ClarificationFlow::new(
            llm,
            store.clone(),
            SectionCache::new(),
            PendingStore::new(),
            Arc::new(MemoryVectorIndex::new(Arc::new(HashEmbedder::new(32)))),
            50,
            Arc::new(NoopSink),
        );

        flow.sections.append(KEY, "property_division", "- Existing: prior line");
        let missing = detect_missing("", Topic::PropertyDivision, 5);
        flow.open(KEY, "How is the house split?", Topic::PropertyDivision, missing);

        let answers = HashMap::from([
            ("asset_pool".to_string(), "$1.2M home".to_string()),
            ("contributions".to_string(), "wife was homemaker".to_string()),
        ]);
        let pending = flow.submit(KEY, &answers).await.unwrap();
        assert_eq!(pending.question, "How is the house split?");

        // Summary document: appended, persisted.
        let stored = store.load_summary(6).await.unwrap().unwrap();
        let summary = parse_summary(&stored);
        assert_eq!(summary.property.asset_pool.items(), ["$1.2M home"]);
        assert_eq!(summary.property.contributions.items(), ["wife was homemaker"]);

        // Section cache: prior text is a prefix, new lines appended.
        let section = flow.sections.get(KEY, "property_division").unwrap();
        assert!(section.starts_with("- Existing: prior line"));
        assert!(section.contains("- Asset Pool: $1.2M home"));
        assert!(section.contains("wife was homemaker"));

        // Uploaded index: the topic section was embedded.
        assert_eq!(flow.uploaded_index.count().await, 1);

        // Pending is consumed.
        assert!(!flow.pending.contains(KEY));
    }

    #[tokio::test]
    async fn long_answers_fall_back_to_truncation_when_summarization_fails() {
        let store = Arc::new(MemoryCaseStore::new().with_case(6, "{}"));
        let flow = flow(Arc::new(FailingCompletion), store.clone());

        let missing = detect_missing("", Topic::PropertyDivision, 5);
        flow.open(KEY, "question", Topic::PropertyDivision, missing);

        let long_answer = "detail ".repeat(80);
        let answers = HashMap::from([("asset_pool".to_string(), long_answer)]);
        flow.submit(KEY, &answers).await.unwrap();

        let stored = store.load_summary(6).await.unwrap().unwrap();
        let summary = parse_summary(&stored);
        let value = &summary.property.asset_pool.items()[0];
        assert!(value.ends_with('…'));
        assert!(value.split_whitespace().count() <= 50);
    }

    #[tokio::test]
    async fn rounds_accumulate_instead_of_replacing() {
        let store = Arc::new(MemoryCaseStore::new().with_case(6, "{}"));
        let llm: Arc<dyn CompletionProvider> = Arc::new(KeyedCompletion::new(vec![]));
        let flow = flow(llm, store.clone());

        for value in ["first round", "second round"] {
            let missing = detect_missing("", Topic::PrenupPostnup, 5);
            flow.open(KEY, "q", Topic::PrenupPostnup, missing);
            let answers = HashMap::from([("legal_advice".to_string(), value.to_string())]);
            flow.submit(KEY, &answers).await.unwrap();
        }

        let summary = parse_summary(&store.load_summary(6).await.unwrap().unwrap());
        assert_eq!(
            summary.prenup_postnup.legal_advice.items(),
            ["first round", "second round"]
        );
    }
}

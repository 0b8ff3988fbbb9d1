//! The engine facade: classify-and-answer-or-clarify, clarification
//! submission, case ingestion and reset.
//!
//! Each inbound question runs start-to-finish against the shared caches; the
//! only suspension points are completion and index calls. Requests for one
//! (user, case) pair are assumed not to run concurrently; different cases
//! are independent because every cache is compound-keyed.

use serde_json::json;
use std::sync::Arc;

use crate::assemble::{build_structured_query, ContextAssembler};
use crate::cache::{HistoryStore, PendingStore, SectionCache};
use crate::clarify::ClarificationFlow;
use crate::classify::TopicClassifier;
use crate::config::EngineConfig;
use crate::detect::detect_missing;
use crate::error::EngineError;
use crate::index::{IndexDocument, KeywordIndex, VectorIndex};
use crate::llm::CompletionProvider;
use crate::observe::{NoopSink, TraceSink};
use crate::search::HybridRetriever;
use crate::store::CaseStore;
use crate::summary::{self, parse_summary, serialize_summary, CaseSummary};
use crate::templates;
use crate::topics::Topic;
use crate::types::{
    AnswerPayload, AskOutcome, CaseKey, Citation, SourceKind, META_CASE_ID, META_CASE_NAME,
    META_SOURCE, META_SOURCE_TYPE, META_SUMMARY_SECTION,
};

/// One logical retrieval corpus: a dense index plus an optional sparse arm
/// built from the same documents.
#[derive(Clone)]
pub struct Corpus {
    pub vector: Arc<dyn VectorIndex>,
    pub keyword: Option<Arc<dyn KeywordIndex>>,
}

impl Corpus {
    pub fn vector_only(vector: Arc<dyn VectorIndex>) -> Self {
        Self {
            vector,
            keyword: None,
        }
    }
}

/// The four corpora the engine threads a question through.
#[derive(Clone)]
pub struct CorpusSet {
    pub statutes: Corpus,
    pub case_summaries: Corpus,
    pub judgments: Corpus,
    /// Uploaded-case sections; written on ingest and clarification patches.
    pub uploaded: Arc<dyn VectorIndex>,
}

pub struct AdviceEngine {
    config: EngineConfig,
    llm: Arc<dyn CompletionProvider>,
    store: Arc<dyn CaseStore>,
    sections: SectionCache,
    pending: PendingStore,
    history: HistoryStore,
    classifier: TopicClassifier,
    clarify: ClarificationFlow,
    assembler: ContextAssembler,
    general: HybridRetriever,
    uploaded_index: Arc<dyn VectorIndex>,
    sink: Arc<dyn TraceSink>,
}

impl AdviceEngine {
    pub fn new(
        config: EngineConfig,
        llm: Arc<dyn CompletionProvider>,
        corpora: CorpusSet,
        store: Arc<dyn CaseStore>,
    ) -> Self {
        Self::with_sink(config, llm, corpora, store, Arc::new(NoopSink))
    }

    pub fn with_sink(
        config: EngineConfig,
        llm: Arc<dyn CompletionProvider>,
        corpora: CorpusSet,
        store: Arc<dyn CaseStore>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        let sections = SectionCache::new();
        let pending = PendingStore::new();
        let history = HistoryStore::new();

        let retriever = |corpus: &Corpus, label: &'static str| {
            HybridRetriever::new(
                label,
                corpus.vector.clone(),
                corpus.keyword.clone(),
                Some(llm.clone()),
                config.retrieval.clone(),
            )
        };

        let assembler = ContextAssembler::new(
            retriever(&corpora.statutes, "statutes"),
            retriever(&corpora.case_summaries, "case_summaries"),
            retriever(&corpora.judgments, "judgments"),
            llm.clone(),
            sink.clone(),
        );
        let general = retriever(&corpora.judgments, "judgments_general");

        let clarify = ClarificationFlow::new(
            llm.clone(),
            store.clone(),
            sections.clone(),
            pending.clone(),
            corpora.uploaded.clone(),
            config.clarify.answer_word_cap,
            sink.clone(),
        );

        Self {
            classifier: TopicClassifier::new(llm.clone()),
            config,
            llm,
            store,
            sections,
            pending,
            history,
            clarify,
            assembler,
            general,
            uploaded_index: corpora.uploaded,
            sink,
        }
    }

    /// Classify-and-answer-or-clarify: the main entry point for a question
    /// about an uploaded case.
    pub async fn ask(
        &self,
        user_id: i64,
        case_id: i64,
        question: &str,
        explicit_topic: Option<Topic>,
    ) -> Result<AskOutcome, EngineError> {
        let key = CaseKey::new(user_id, case_id);
        let summary_json = self.require_case(case_id).await?;

        let history_text = self.history.recent_text(key, self.config.history.max_turns);
        let topic = self.classifier.classify(question, explicit_topic).await;
        tracing::info!(case_id, topic = %topic, "Processing case question");

        let section_text = self.section_text(key, topic, &summary_json);
        let missing = detect_missing(&section_text, topic, self.config.clarify.max_questions);

        if !missing.is_empty() {
            let payload = self.clarify.open(key, question, topic, missing);
            return Ok(AskOutcome::Clarification(payload));
        }

        let payload = self
            .answer_with_context(key, question, topic, &section_text, &history_text)
            .await?;
        Ok(AskOutcome::Answer(payload))
    }

    /// Consume the pending clarification for a case and resume the
    /// originally parked question against the patched section map.
    pub async fn submit_clarification(
        &self,
        user_id: i64,
        case_id: i64,
        answers: &std::collections::HashMap<String, String>,
    ) -> Result<AnswerPayload, EngineError> {
        let key = CaseKey::new(user_id, case_id);
        self.require_case(case_id).await?;

        let pending = self.clarify.submit(key, answers).await?;

        let history_text = self.history.recent_text(key, self.config.history.max_turns);
        let section_text = self
            .sections
            .get(key, pending.topic.as_str())
            .unwrap_or_default();

        self.answer_with_context(key, &pending.question, pending.topic, &section_text, &history_text)
            .await
    }

    /// Answer a question against the judgment corpus without an uploaded
    /// case. Degrades to an explicit "no material" answer when nothing
    /// relevant is indexed.
    pub async fn ask_general(
        &self,
        question: &str,
        history_text: Option<&str>,
    ) -> Result<AnswerPayload, EngineError> {
        let retrieval_query =
            build_structured_query(question, "", history_text.unwrap_or(""), Topic::Other);
        let nodes = match self
            .general
            .retrieve(
                &retrieval_query,
                None,
                None,
                self.config.retrieval.use_rerank,
            )
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(error = %e, "General retrieval failed");
                Vec::new()
            }
        };

        let threshold = self.config.retrieval.min_relevance_score;
        let relevant: Vec<_> = nodes.into_iter().filter(|n| n.score >= threshold).collect();

        if relevant.is_empty() {
            tracing::warn!(question, "No nodes passed the relevance threshold");
            return Ok(AnswerPayload {
                answer: format!(
                    "No relevant material was found for your question: '{}'",
                    question
                ),
                citations: Vec::new(),
            });
        }

        let context = relevant
            .iter()
            .map(|n| n.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let history_block = match history_text {
            Some(history) if !history.is_empty() => {
                format!("Conversation history:\n{}\n\n", history)
            }
            _ => String::new(),
        };
        let prompt = templates::qa_prompt(
            relevant.len(),
            &context,
            &format!("{}{}", history_block, question),
        );

        let answer = self
            .llm
            .complete(&prompt)
            .await
            .map_err(EngineError::Completion)?;

        let citations = relevant
            .iter()
            .map(|node| Citation {
                source: node
                    .meta(META_CASE_NAME)
                    .or_else(|| node.meta(META_SOURCE))
                    .unwrap_or("Unknown")
                    .to_string(),
                kind: SourceKind::CaseLaw,
                reference: node.meta(META_CASE_ID).map(str::to_string),
                url: None,
            })
            .collect();

        Ok(AnswerPayload { answer, citations })
    }

    /// Generate a structured summary from an uploaded case narrative, persist
    /// it, refresh the section cache, and embed its sections. File handling
    /// and identity resolution stay with the caller.
    pub async fn ingest_case_narrative(
        &self,
        user_id: i64,
        case_id: i64,
        case_text: &str,
    ) -> Result<CaseSummary, EngineError> {
        let summary = summary::generate(self.llm.as_ref(), case_text, &self.config.summary).await;
        self.store
            .save_summary(case_id, &serialize_summary(&summary))
            .await
            .map_err(EngineError::Store)?;
        self.install_case_summary(user_id, case_id, &summary).await;
        Ok(summary)
    }

    /// Refresh the section cache and uploaded-case embeddings from an
    /// already-parsed summary (e.g. restoring a stored case).
    pub async fn install_case_summary(&self, user_id: i64, case_id: i64, summary: &CaseSummary) {
        let key = CaseKey::new(user_id, case_id);
        self.sections
            .replace_all(key, summary.to_sections(false));
        self.sink.event(
            "install",
            "section_cache_refreshed",
            json!({"case_id": case_id}),
        );

        let documents: Vec<IndexDocument> = summary
            .to_sections(true)
            .into_iter()
            .map(|(section, text)| IndexDocument {
                id: format!("case-{}-{}", case_id, section),
                text,
                metadata: std::collections::HashMap::from([
                    (META_SOURCE_TYPE.to_string(), "uploaded_case".to_string()),
                    (META_CASE_ID.to_string(), case_id.to_string()),
                    (META_SUMMARY_SECTION.to_string(), section.to_string()),
                ]),
            })
            .collect();

        if let Err(e) = self.uploaded_index.upsert(documents).await {
            tracing::warn!(case_id, error = %e, "Embedding uploaded case sections failed");
        }
    }

    /// Clear all cached state for a case, across every user holding it.
    pub fn reset_case(&self, case_id: i64) {
        self.sections.clear_case(case_id);
        self.pending.clear_case(case_id);
        self.history.clear_case(case_id);
        self.sink
            .event("reset", "case_cleared", json!({"case_id": case_id}));
    }

    pub fn has_pending(&self, user_id: i64, case_id: i64) -> bool {
        self.pending.contains(CaseKey::new(user_id, case_id))
    }

    async fn require_case(&self, case_id: i64) -> Result<String, EngineError> {
        self.store
            .load_summary(case_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::CaseNotFound(case_id))
    }

    /// Cached section text for a topic, rebuilding the whole section map from
    /// the stored summary on a miss.
    fn section_text(&self, key: CaseKey, topic: Topic, summary_json: &str) -> String {
        if let Some(text) = self.sections.get(key, topic.as_str()) {
            return text;
        }
        let summary = parse_summary(summary_json);
        self.sections.replace_all(key, summary.to_sections(false));
        self.sink.event(
            "ask",
            "section_cache_rebuilt",
            json!({"case_id": key.case_id}),
        );
        self.sections.get(key, topic.as_str()).unwrap_or_default()
    }

    async fn answer_with_context(
        &self,
        key: CaseKey,
        question: &str,
        topic: Topic,
        section_text: &str,
        history_text: &str,
    ) -> Result<AnswerPayload, EngineError> {
        let impact_text = self
            .sections
            .get(key, "impact_analysis")
            .unwrap_or_default();

        let assembled = self
            .assembler
            .answer(question, section_text, history_text, topic, &impact_text)
            .await
            .map_err(EngineError::Completion)?;

        self.history
            .record_exchange(key, question, &assembled.cache_summary);

        Ok(AnswerPayload {
            answer: assembled.answer,
            citations: assembled.citations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryVectorIndex;
    use crate::store::MemoryCaseStore;
    use crate::testutil::{HashEmbedder, KeyedCompletion};
    use std::collections::HashMap;

    const ANSWER_RESPONSE: &str =
        "## Direct Answer\nLikely an equal split.\n---CACHE_SUMMARY---\nEqual split advice given.";

    fn corpus_set() -> CorpusSet {
        let embedder = Arc::new(HashEmbedder::new(64));
        let vector = || Arc::new(MemoryVectorIndex::new(embedder.clone()));
        CorpusSet {
            statutes: Corpus::vector_only(vector()),
            case_summaries: Corpus::vector_only(vector()),
            judgments: Corpus::vector_only(vector()),
            uploaded: vector(),
        }
    }

    fn engine_with(llm: KeyedCompletion, store: MemoryCaseStore) -> AdviceEngine {
        AdviceEngine::new(
            EngineConfig::default(),
            Arc::new(llm),
            corpus_set(),
            Arc::new(store),
        )
    }

    fn property_llm() -> KeyedCompletion {
        KeyedCompletion::new(vec![
            ("legal topic", "property_division"),
            ("ROLE: Senior", ANSWER_RESPONSE),
        ])
    }

    /// Summary whose property section already covers every required factor.
    const COMPLETE_PROPERTY_SUMMARY: &str = r#"{
        "property": {
            "asset_pool": ["asset pool: family home with a mortgage"],
            "contributions": ["financial contributions and homemaker role"],
            "future_needs": ["income disparity and health issues"],
            "existing_agreements": ["no binding agreement or order in place"]
        }
    }"#;

    #[tokio::test]
    async fn unknown_case_is_rejected() {
        let engine = engine_with(property_llm(), MemoryCaseStore::new());
        let result = engine.ask(1, 99, "How is the house split?", None).await;
        assert!(matches!(result, Err(EngineError::CaseNotFound(99))));
    }

    #[tokio::test]
    async fn bare_case_triggers_clarification_not_answer() {
        let engine = engine_with(property_llm(), MemoryCaseStore::new().with_case(6, "{}"));

        let outcome = engine
            .ask(1, 6, "How is the house split?", None)
            .await
            .unwrap();
        let AskOutcome::Clarification(payload) = outcome else {
            panic!("expected clarification");
        };
        assert!(payload.questions.len() <= 5);
        assert!(payload.missing_fields.contains(&"asset_pool".to_string()));
        assert!(payload.missing_fields.contains(&"contributions".to_string()));
        assert!(engine.has_pending(1, 6));
        // No history is recorded for a clarification turn.
        assert_eq!(engine.history.turn_count(CaseKey::new(1, 6)), 0);
    }

    #[tokio::test]
    async fn clarification_submission_patches_and_answers() {
        let engine = engine_with(property_llm(), MemoryCaseStore::new().with_case(6, "{}"));

        engine.ask(1, 6, "How is the house split?", None).await.unwrap();

        let answers = HashMap::from([
            ("asset_pool".to_string(), "$1.2M home".to_string()),
            ("contributions".to_string(), "wife was homemaker".to_string()),
        ]);
        let payload = engine.submit_clarification(1, 6, &answers).await.unwrap();
        assert!(payload.answer.contains("Likely an equal split."));
        assert!(!engine.has_pending(1, 6));

        // The patched section holds both new lines.
        let section = engine
            .sections
            .get(CaseKey::new(1, 6), "property_division")
            .unwrap();
        assert!(section.contains("$1.2M home"));
        assert!(section.contains("wife was homemaker"));

        // The condensed summary, not the full answer, lands in history.
        let history = engine.history.recent_text(CaseKey::new(1, 6), 8);
        assert!(history.contains("Lawyer: Equal split advice given."));
        assert!(!history.contains("Direct Answer"));

        // Remaining factors are still missing, so re-asking clarifies again.
        let outcome = engine
            .ask(1, 6, "How is the house split?", None)
            .await
            .unwrap();
        let AskOutcome::Clarification(payload) = outcome else {
            panic!("expected a fresh clarification for still-missing factors");
        };
        assert!(payload.missing_fields.contains(&"future_needs".to_string()));
        assert!(!payload.missing_fields.contains(&"asset_pool".to_string()));
    }

    #[tokio::test]
    async fn complete_section_answers_with_empty_citations_on_empty_indexes() {
        let engine = engine_with(
            property_llm(),
            MemoryCaseStore::new().with_case(6, COMPLETE_PROPERTY_SUMMARY),
        );

        let outcome = engine
            .ask(1, 6, "How is the house split?", None)
            .await
            .unwrap();
        let AskOutcome::Answer(payload) = outcome else {
            panic!("expected an answer");
        };
        assert!(payload.answer.contains("Likely an equal split."));
        assert!(payload.citations.is_empty());
    }

    #[tokio::test]
    async fn submit_without_pending_is_rejected() {
        let engine = engine_with(property_llm(), MemoryCaseStore::new().with_case(6, "{}"));
        let result = engine.submit_clarification(1, 6, &HashMap::new()).await;
        assert!(matches!(result, Err(EngineError::NoPendingClarification(6))));
    }

    #[tokio::test]
    async fn explicit_topic_skips_classification() {
        // No "legal topic" rule: a classification call would return "other"
        // and the property factors would never be consulted.
        let llm = KeyedCompletion::new(vec![("ROLE: Senior", ANSWER_RESPONSE)]);
        let engine = engine_with(llm, MemoryCaseStore::new().with_case(6, "{}"));

        let outcome = engine
            .ask(1, 6, "How is the house split?", Some(Topic::PropertyDivision))
            .await
            .unwrap();
        assert!(matches!(outcome, AskOutcome::Clarification(_)));
    }

    #[tokio::test]
    async fn reset_clears_case_state() {
        let engine = engine_with(property_llm(), MemoryCaseStore::new().with_case(6, "{}"));
        engine.ask(1, 6, "How is the house split?", None).await.unwrap();
        assert!(engine.has_pending(1, 6));

        engine.reset_case(6);
        assert!(!engine.has_pending(1, 6));
        assert!(engine.sections.get(CaseKey::new(1, 6), "facts").is_none());
    }

    #[tokio::test]
    async fn ingest_embeds_sections_and_persists_summary() {
        let llm = KeyedCompletion::new(vec![(
            "STRICT JSON",
            r#"{"facts": ["married 12 years"], "property": {"asset_pool": ["home $1.2M"]}}"#,
        )]);
        let store = Arc::new(MemoryCaseStore::new());
        let engine = AdviceEngine::new(
            EngineConfig::default(),
            Arc::new(llm),
            corpus_set(),
            store.clone(),
        );

        let summary = engine
            .ingest_case_narrative(1, 6, "We separated and disagree about the house.")
            .await
            .unwrap();
        assert_eq!(summary.facts.items(), ["married 12 years"]);
        // Undecided narrative: no outcome stored.
        assert!(summary.outcome_orders.is_none());

        assert!(store.load_summary(6).await.unwrap().is_some());
        assert!(engine.uploaded_index.count().await >= 2);
        assert!(engine
            .sections
            .get(CaseKey::new(1, 6), "property_division")
            .is_some());
    }

    #[tokio::test]
    async fn general_path_reports_missing_material() {
        let engine = engine_with(property_llm(), MemoryCaseStore::new());
        let payload = engine.ask_general("What did the court hold?", None).await.unwrap();
        assert!(payload.answer.contains("No relevant material"));
        assert!(payload.citations.is_empty());
    }
}

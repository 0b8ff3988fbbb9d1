//! Process-wide caches keyed by (user, case).
//!
//! All three stores are derived or transient state: the section cache is a
//! materialized view of the structured case summary, the pending store holds
//! at most one in-flight clarification per case, and the history store keeps
//! the condensed conversation trail. Each uses one flat map under a compound
//! key so clearing a case and isolating a user are explicit operations; the
//! only iterating access is whole-case deletion.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::topics::Topic;
use crate::types::CaseKey;

/// Cached flattened text per (user, case, topic section). Not a source of
/// truth: always reconstructible from the structured case summary.
#[derive(Clone, Default)]
pub struct SectionCache {
    inner: Arc<DashMap<CaseKey, HashMap<String, String>>>,
}

impl SectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CaseKey, section: &str) -> Option<String> {
        self.inner
            .get(&key)
            .and_then(|sections| sections.get(section).cloned())
    }

    pub fn has_case(&self, key: CaseKey) -> bool {
        self.inner.contains_key(&key)
    }

    /// Replace the whole section map for a case — used when the summary
    /// document is (re-)parsed.
    pub fn replace_all(&self, key: CaseKey, sections: Vec<(&'static str, String)>) {
        let map: HashMap<String, String> = sections
            .into_iter()
            .map(|(section, text)| (section.to_string(), text))
            .collect();
        self.inner.insert(key, map);
    }

    /// Append text to one section, preserving what was already cached —
    /// used when a clarification patches a topic.
    pub fn append(&self, key: CaseKey, section: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut entry = self.inner.entry(key).or_default();
        if let Some(existing) = entry.get_mut(section) {
            if !existing.is_empty() {
                existing.push('\n');
            }
            existing.push_str(text);
            return;
        }
        entry.insert(section.to_string(), text.to_string());
    }

    pub fn clear_case(&self, case_id: i64) {
        self.inner.retain(|key, _| key.case_id != case_id);
    }
}

/// The record of an in-flight request for missing facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingClarification {
    pub question: String,
    pub topic: Topic,
    pub missing_fields: Vec<String>,
    pub questions: Vec<String>,
}

/// At most one pending clarification per (user, case). Consumed atomically
/// on submission via `take`.
#[derive(Clone, Default)]
pub struct PendingStore {
    inner: Arc<DashMap<CaseKey, PendingClarification>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: CaseKey, pending: PendingClarification) {
        self.inner.insert(key, pending);
    }

    pub fn take(&self, key: CaseKey) -> Option<PendingClarification> {
        self.inner.remove(&key).map(|(_, pending)| pending)
    }

    pub fn contains(&self, key: CaseKey) -> bool {
        self.inner.contains_key(&key)
    }

    pub fn clear_case(&self, case_id: i64) {
        self.inner.retain(|key, _| key.case_id != case_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Conversation trail per (user, case). Assistant turns hold only the
/// condensed cache summary of the answer, bounding growth while keeping
/// enough context for follow-ups.
#[derive(Clone, Default)]
pub struct HistoryStore {
    inner: Arc<DashMap<CaseKey, Vec<HistoryTurn>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_exchange(&self, key: CaseKey, question: &str, condensed_answer: &str) {
        let now = chrono::Utc::now();
        let mut turns = self.inner.entry(key).or_default();
        turns.push(HistoryTurn {
            role: Role::User,
            content: question.to_string(),
            at: now,
        });
        turns.push(HistoryTurn {
            role: Role::Assistant,
            content: condensed_answer.to_string(),
            at: now,
        });
    }

    /// The last `max_turns` turns formatted for prompt context.
    pub fn recent_text(&self, key: CaseKey, max_turns: usize) -> String {
        let Some(turns) = self.inner.get(&key) else {
            return String::new();
        };
        let start = turns.len().saturating_sub(max_turns);
        turns[start..]
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    Role::User => "Client",
                    Role::Assistant => "Lawyer",
                };
                format!("{}: {}", speaker, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn turn_count(&self, key: CaseKey) -> usize {
        self.inner.get(&key).map(|turns| turns.len()).unwrap_or(0)
    }

    pub fn clear_case(&self, case_id: i64) {
        self.inner.retain(|key, _| key.case_id != case_id);
    }
}

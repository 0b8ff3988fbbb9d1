//! Relational-store boundary: the core treats persistence purely as the
//! get/set surface for a case's serialized structured summary. Transactions,
//! migrations, users and Q&A audit rows live behind this port.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait CaseStore: Send + Sync {
    /// The serialized structured summary for a case, or `None` when the case
    /// does not exist.
    async fn load_summary(&self, case_id: i64) -> Result<Option<String>>;

    async fn save_summary(&self, case_id: i64, summary_json: &str) -> Result<()>;
}

/// In-process store used in tests and single-process deployments.
#[derive(Default)]
pub struct MemoryCaseStore {
    summaries: DashMap<i64, String>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case(self, case_id: i64, summary_json: impl Into<String>) -> Self {
        self.summaries.insert(case_id, summary_json.into());
        self
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn load_summary(&self, case_id: i64) -> Result<Option<String>> {
        Ok(self.summaries.get(&case_id).map(|entry| entry.clone()))
    }

    async fn save_summary(&self, case_id: i64, summary_json: &str) -> Result<()> {
        self.summaries.insert(case_id, summary_json.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_summaries() {
        let store = MemoryCaseStore::new().with_case(1, "{}");
        assert_eq!(store.load_summary(1).await.unwrap().unwrap(), "{}");
        assert!(store.load_summary(2).await.unwrap().is_none());

        store.save_summary(1, r#"{"facts": []}"#).await.unwrap();
        assert!(store
            .load_summary(1)
            .await
            .unwrap()
            .unwrap()
            .contains("facts"));
    }
}

//! Topic classification: explicit caller input always wins; otherwise one
//! completion call constrained to the fixed vocabulary. No retry — anything
//! the vocabulary doesn't recognize is `Other`.

use std::sync::Arc;

use crate::llm::CompletionProvider;
use crate::templates;
use crate::topics::Topic;

pub struct TopicClassifier {
    llm: Arc<dyn CompletionProvider>,
}

impl TopicClassifier {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, question: &str, explicit: Option<Topic>) -> Topic {
        if let Some(topic) = explicit {
            if topic != Topic::Other {
                return topic;
            }
        }

        let prompt = templates::classify_prompt(question);
        match self.llm.complete(&prompt).await {
            Ok(response) => {
                let topic = Topic::parse(&response);
                tracing::debug!(response = %response.trim(), topic = %topic, "Topic classified");
                topic
            }
            Err(e) => {
                tracing::warn!(error = %e, "Topic classification call failed; treating as 'other'");
                Topic::Other
            }
        }
    }
}

//! Missing-factor detection: which facts a topic requires that the case's
//! known text does not yet cover.
//!
//! Recall-biased and precision-agnostic by design. A factor counts as present
//! if any of its keywords appears as a case-insensitive substring; the cost
//! of a miss is one extra clarifying question, never a wrong answer.

use crate::topics::{factors, Topic};

#[derive(Debug, Clone, Default)]
pub struct MissingFactors {
    pub fields: Vec<String>,
    pub questions: Vec<String>,
}

impl MissingFactors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Detect missing factors for a topic in declared order, capped at
/// `max_questions` so the client is never overwhelmed.
pub fn detect_missing(known_text: &str, topic: Topic, max_questions: usize) -> MissingFactors {
    let lowered = known_text.to_lowercase();
    let mut missing = MissingFactors::default();

    for factor in factors(topic) {
        if missing.fields.len() >= max_questions {
            break;
        }
        let covered = factor
            .keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()));
        if !covered {
            missing.fields.push(factor.id.to_string());
            missing.questions.push(factor.question.to_string());
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_misses_everything_up_to_cap() {
        let missing = detect_missing("", Topic::ChildrenParenting, 5);
        assert_eq!(missing.fields.len(), 5);
        assert_eq!(missing.questions.len(), 5);
        // Declared order is preserved.
        assert_eq!(missing.fields[0], "child_ages");
    }

    #[test]
    fn house_split_scenario_flags_asset_pool_and_contributions() {
        // Section text with no asset or contribution keywords.
        let section = "- Just & Equitable: the parties want a fair outcome";
        let missing = detect_missing(section, Topic::PropertyDivision, 5);
        assert!(missing.fields.contains(&"asset_pool".to_string()));
        assert!(missing.fields.contains(&"contributions".to_string()));
        assert!(missing.questions.len() <= 5);
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let missing = detect_missing(
            "The ASSET pool includes the home and a Mortgage.",
            Topic::PropertyDivision,
            5,
        );
        assert!(!missing.fields.contains(&"asset_pool".to_string()));
    }

    #[test]
    fn adding_keywords_is_monotone() {
        let mut text = String::new();
        let mut previous = detect_missing(&text, Topic::SpousalMaintenance, 10)
            .fields
            .len();

        for addition in [
            "my income is $900 a week and expenses are high",
            "I cannot work full-time for health reasons",
            "we were married for 14 years",
            "we enjoyed a comfortable lifestyle",
        ] {
            text.push(' ');
            text.push_str(addition);
            let current = detect_missing(&text, Topic::SpousalMaintenance, 10)
                .fields
                .len();
            assert!(current <= previous, "missing count increased after '{}'", addition);
            previous = current;
        }
    }

    #[test]
    fn other_topic_never_needs_clarification() {
        let missing = detect_missing("", Topic::Other, 5);
        assert!(missing.is_empty());
    }

    #[test]
    fn cap_limits_questions() {
        let missing = detect_missing("", Topic::ChildrenParenting, 3);
        assert_eq!(missing.fields.len(), 3);
        assert_eq!(missing.questions.len(), 3);
    }
}

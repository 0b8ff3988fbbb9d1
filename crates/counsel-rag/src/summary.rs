//! The structured case summary: the canonical document of extracted facts,
//! issues and per-topic analysis for one uploaded case.
//!
//! Every leaf is a `FieldValue` — a schema-validated list of short strings
//! that normalizes whatever shape the model emitted (null, bare string, or
//! list) into one known variant, so the append/patch logic never inspects
//! runtime types. `outcome_orders` is the single nullable field: `None`
//! means "undecided matter", an empty list means "no orders recorded".

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::SummaryConfig;
use crate::llm::CompletionProvider;
use crate::templates;
use crate::topics::Topic;

/// A list-valued summary leaf. Either empty-or-null or a list of non-blank
/// strings; nothing else survives deserialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldValue {
    #[default]
    Empty,
    Items(Vec<String>),
}

impl FieldValue {
    pub fn items(&self) -> &[String] {
        match self {
            FieldValue::Empty => &[],
            FieldValue::Items(items) => items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Append a value, never overwriting what is already there.
    pub fn push(&mut self, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        match self {
            FieldValue::Empty => *self = FieldValue::Items(vec![trimmed.to_string()]),
            FieldValue::Items(items) => items.push(trimmed.to_string()),
        }
    }

    pub fn pop(&mut self) {
        if let FieldValue::Items(items) = self {
            items.pop();
        }
    }

    pub fn truncate(&mut self, limit: usize) {
        if let FieldValue::Items(items) = self {
            items.truncate(limit);
        }
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    FieldValue::Empty
                } else {
                    FieldValue::Items(vec![trimmed.to_string()])
                }
            }
            serde_json::Value::Array(values) => {
                let items: Vec<String> = values
                    .into_iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => {
                            let trimmed = s.trim();
                            if trimmed.is_empty() {
                                None
                            } else {
                                Some(trimmed.to_string())
                            }
                        }
                        _ => None,
                    })
                    .collect();
                if items.is_empty() {
                    FieldValue::Empty
                } else {
                    FieldValue::Items(items)
                }
            }
            _ => FieldValue::Empty,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(FieldValue::from_json(value))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySection {
    pub asset_pool: FieldValue,
    pub contributions: FieldValue,
    pub future_needs: FieldValue,
    pub just_equitable: FieldValue,
    pub living_arrangements: FieldValue,
    pub existing_agreements: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub need: FieldValue,
    pub capacity_to_pay: FieldValue,
    pub statutory_factors: FieldValue,
    pub income_expenses: FieldValue,
    pub earning_capacity: FieldValue,
    pub health_care: FieldValue,
    pub relationship_length: FieldValue,
    pub standard_of_living: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentingSection {
    pub child_ages: FieldValue,
    pub current_arrangements: FieldValue,
    pub caregiver_history: FieldValue,
    pub availability: FieldValue,
    pub safety_concerns: FieldValue,
    pub child_views: FieldValue,
    pub allegations: FieldValue,
    pub expert_evidence: FieldValue,
    pub best_interests: FieldValue,
    pub orders: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolenceSection {
    pub incidents: FieldValue,
    pub protection_orders: FieldValue,
    pub police_court: FieldValue,
    pub child_exposure: FieldValue,
    pub safety_plan: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementSection {
    pub agreement_date: FieldValue,
    pub legal_advice: FieldValue,
    pub financial_disclosure: FieldValue,
    pub pressure_duress: FieldValue,
    pub changed_circumstances: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactSection {
    pub pivotal_findings: FieldValue,
    pub statutory_pivots: FieldValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseSummary {
    pub case_name: String,
    pub court: String,
    pub date: String,
    pub parties: FieldValue,
    pub issues: FieldValue,
    pub facts: FieldValue,
    pub property: PropertySection,
    pub spousal_maintenance: MaintenanceSection,
    pub parenting: ParentingSection,
    pub family_violence_safety: ViolenceSection,
    pub prenup_postnup: AgreementSection,
    /// `None` = undecided matter; `Some` with an empty list = decided but no
    /// orders recorded.
    pub outcome_orders: Option<FieldValue>,
    pub impact_analysis: ImpactSection,
    pub reasons_rationale: FieldValue,
    pub uncertainties: FieldValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_summary: Option<String>,
}

/// Per-field list caps, bounding how much any one summary can contribute to
/// a prompt. Unlisted fields cap at `default_limit`.
pub struct ListLimits {
    entries: &'static [(&'static str, usize)],
    default_limit: usize,
}

impl ListLimits {
    pub fn limit_for(&self, key: &str) -> usize {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .unwrap_or(self.default_limit)
    }
}

pub static PRIMARY_LIST_LIMITS: ListLimits = ListLimits {
    entries: &[
        ("facts", 16),
        ("issues", 10),
        ("outcome_orders", 10),
        ("reasons_rationale", 12),
        ("uncertainties", 4),
        ("asset_pool", 8),
        ("contributions", 10),
        ("future_needs", 8),
        ("just_equitable", 8),
        ("living_arrangements", 6),
        ("existing_agreements", 6),
        ("need", 8),
        ("capacity_to_pay", 8),
        ("statutory_factors", 8),
        ("income_expenses", 8),
        ("earning_capacity", 8),
        ("health_care", 6),
        ("relationship_length", 3),
        ("standard_of_living", 6),
        ("child_ages", 6),
        ("current_arrangements", 8),
        ("caregiver_history", 8),
        ("availability", 6),
        ("safety_concerns", 8),
        ("child_views", 8),
        ("allegations", 8),
        ("expert_evidence", 6),
        ("best_interests", 8),
        ("orders", 10),
        ("incidents", 8),
        ("protection_orders", 6),
        ("police_court", 6),
        ("child_exposure", 6),
        ("safety_plan", 6),
        ("agreement_date", 2),
        ("legal_advice", 6),
        ("financial_disclosure", 6),
        ("pressure_duress", 6),
        ("changed_circumstances", 6),
        ("parties", 8),
        ("pivotal_findings", 8),
        ("statutory_pivots", 8),
    ],
    default_limit: 5,
};

/// Tighter caps applied when the primary limits still leave the rendered
/// summary over the word budget.
pub static FALLBACK_LIST_LIMITS: ListLimits = ListLimits {
    entries: &[
        ("facts", 10),
        ("issues", 6),
        ("outcome_orders", 6),
        ("reasons_rationale", 8),
        ("uncertainties", 3),
        ("asset_pool", 8),
        ("contributions", 10),
        ("future_needs", 8),
        ("just_equitable", 8),
        ("living_arrangements", 6),
        ("existing_agreements", 6),
        ("need", 8),
        ("capacity_to_pay", 8),
        ("statutory_factors", 8),
        ("income_expenses", 8),
        ("earning_capacity", 8),
        ("health_care", 6),
        ("relationship_length", 3),
        ("standard_of_living", 6),
        ("child_ages", 6),
        ("current_arrangements", 8),
        ("caregiver_history", 8),
        ("availability", 6),
        ("safety_concerns", 8),
        ("child_views", 8),
        ("allegations", 8),
        ("expert_evidence", 6),
        ("best_interests", 8),
        ("orders", 10),
        ("incidents", 8),
        ("protection_orders", 6),
        ("police_court", 6),
        ("child_exposure", 6),
        ("safety_plan", 6),
        ("agreement_date", 2),
        ("legal_advice", 6),
        ("financial_disclosure", 6),
        ("pressure_duress", 6),
        ("changed_circumstances", 6),
        ("parties", 8),
        ("pivotal_findings", 8),
        ("statutory_pivots", 8),
    ],
    default_limit: 5,
};

impl CaseSummary {
    /// Empty structure standing in for a summary that failed to generate or
    /// parse, annotated so downstream can see why it is empty.
    pub fn placeholder(raw_excerpt: Option<String>, uncertainty: &str) -> Self {
        let mut summary = CaseSummary {
            outcome_orders: Some(FieldValue::Empty),
            ..CaseSummary::default()
        };
        if let Some(excerpt) = raw_excerpt {
            summary.facts.push(excerpt);
        }
        summary.uncertainties.push(uncertainty);
        summary
    }

    fn for_each_field<F: FnMut(&'static str, &mut FieldValue)>(&mut self, mut f: F) {
        f("parties", &mut self.parties);
        f("issues", &mut self.issues);
        f("facts", &mut self.facts);
        f("asset_pool", &mut self.property.asset_pool);
        f("contributions", &mut self.property.contributions);
        f("future_needs", &mut self.property.future_needs);
        f("just_equitable", &mut self.property.just_equitable);
        f("living_arrangements", &mut self.property.living_arrangements);
        f("existing_agreements", &mut self.property.existing_agreements);
        f("need", &mut self.spousal_maintenance.need);
        f("capacity_to_pay", &mut self.spousal_maintenance.capacity_to_pay);
        f("statutory_factors", &mut self.spousal_maintenance.statutory_factors);
        f("income_expenses", &mut self.spousal_maintenance.income_expenses);
        f("earning_capacity", &mut self.spousal_maintenance.earning_capacity);
        f("health_care", &mut self.spousal_maintenance.health_care);
        f("relationship_length", &mut self.spousal_maintenance.relationship_length);
        f("standard_of_living", &mut self.spousal_maintenance.standard_of_living);
        f("child_ages", &mut self.parenting.child_ages);
        f("current_arrangements", &mut self.parenting.current_arrangements);
        f("caregiver_history", &mut self.parenting.caregiver_history);
        f("availability", &mut self.parenting.availability);
        f("safety_concerns", &mut self.parenting.safety_concerns);
        f("child_views", &mut self.parenting.child_views);
        f("allegations", &mut self.parenting.allegations);
        f("expert_evidence", &mut self.parenting.expert_evidence);
        f("best_interests", &mut self.parenting.best_interests);
        f("orders", &mut self.parenting.orders);
        f("incidents", &mut self.family_violence_safety.incidents);
        f("protection_orders", &mut self.family_violence_safety.protection_orders);
        f("police_court", &mut self.family_violence_safety.police_court);
        f("child_exposure", &mut self.family_violence_safety.child_exposure);
        f("safety_plan", &mut self.family_violence_safety.safety_plan);
        f("agreement_date", &mut self.prenup_postnup.agreement_date);
        f("legal_advice", &mut self.prenup_postnup.legal_advice);
        f("financial_disclosure", &mut self.prenup_postnup.financial_disclosure);
        f("pressure_duress", &mut self.prenup_postnup.pressure_duress);
        f("changed_circumstances", &mut self.prenup_postnup.changed_circumstances);
        f("pivotal_findings", &mut self.impact_analysis.pivotal_findings);
        f("statutory_pivots", &mut self.impact_analysis.statutory_pivots);
        f("reasons_rationale", &mut self.reasons_rationale);
        f("uncertainties", &mut self.uncertainties);
        if let Some(outcome) = self.outcome_orders.as_mut() {
            f("outcome_orders", outcome);
        }
    }

    pub fn apply_list_limits(&mut self, limits: &ListLimits) {
        self.for_each_field(|key, field| field.truncate(limits.limit_for(key)));
    }

    /// Drop items from the largest lists until the rendered text fits the
    /// word budget (or no list has more than one item left).
    pub fn shrink_to_max_words(&mut self, max_words: usize) {
        loop {
            if word_count(&self.rendered_text()) <= max_words {
                break;
            }
            let mut largest: Option<(&'static str, usize)> = None;
            self.for_each_field(|key, field| {
                if field.len() > 1 && largest.map_or(true, |(_, len)| field.len() > len) {
                    largest = Some((key, field.len()));
                }
            });
            let Some((target, _)) = largest else {
                break;
            };
            self.for_each_field(|key, field| {
                if key == target {
                    field.pop();
                }
            });
        }
    }

    /// Append a clarification value into the list field a factor identifier
    /// names, under the given topic. Returns false for unknown factors.
    pub fn append_factor(&mut self, topic: Topic, factor: &str, value: &str) -> bool {
        let Some(field) = self.topic_field_mut(topic, factor) else {
            return false;
        };
        field.push(value);
        true
    }

    fn topic_field_mut(&mut self, topic: Topic, factor: &str) -> Option<&mut FieldValue> {
        match topic {
            Topic::PropertyDivision => match factor {
                "asset_pool" => Some(&mut self.property.asset_pool),
                "contributions" => Some(&mut self.property.contributions),
                "future_needs" => Some(&mut self.property.future_needs),
                "just_equitable" => Some(&mut self.property.just_equitable),
                "living_arrangements" => Some(&mut self.property.living_arrangements),
                "existing_agreements" => Some(&mut self.property.existing_agreements),
                _ => None,
            },
            Topic::ChildrenParenting => match factor {
                "child_ages" => Some(&mut self.parenting.child_ages),
                "current_arrangements" => Some(&mut self.parenting.current_arrangements),
                "caregiver_history" => Some(&mut self.parenting.caregiver_history),
                "availability" => Some(&mut self.parenting.availability),
                "safety_concerns" => Some(&mut self.parenting.safety_concerns),
                "child_views" => Some(&mut self.parenting.child_views),
                "allegations" => Some(&mut self.parenting.allegations),
                "expert_evidence" => Some(&mut self.parenting.expert_evidence),
                _ => None,
            },
            Topic::SpousalMaintenance => match factor {
                "need" => Some(&mut self.spousal_maintenance.need),
                "capacity_to_pay" => Some(&mut self.spousal_maintenance.capacity_to_pay),
                "statutory_factors" => Some(&mut self.spousal_maintenance.statutory_factors),
                "income_expenses" => Some(&mut self.spousal_maintenance.income_expenses),
                "earning_capacity" => Some(&mut self.spousal_maintenance.earning_capacity),
                "health_care" => Some(&mut self.spousal_maintenance.health_care),
                "relationship_length" => Some(&mut self.spousal_maintenance.relationship_length),
                "standard_of_living" => Some(&mut self.spousal_maintenance.standard_of_living),
                _ => None,
            },
            Topic::FamilyViolenceSafety => match factor {
                "incidents" => Some(&mut self.family_violence_safety.incidents),
                "protection_orders" => Some(&mut self.family_violence_safety.protection_orders),
                "police_court" => Some(&mut self.family_violence_safety.police_court),
                "child_exposure" => Some(&mut self.family_violence_safety.child_exposure),
                "safety_plan" => Some(&mut self.family_violence_safety.safety_plan),
                _ => None,
            },
            Topic::PrenupPostnup => match factor {
                "agreement_date" => Some(&mut self.prenup_postnup.agreement_date),
                "legal_advice" => Some(&mut self.prenup_postnup.legal_advice),
                "financial_disclosure" => Some(&mut self.prenup_postnup.financial_disclosure),
                "pressure_duress" => Some(&mut self.prenup_postnup.pressure_duress),
                "changed_circumstances" => Some(&mut self.prenup_postnup.changed_circumstances),
                _ => None,
            },
            Topic::Other => None,
        }
    }

    /// Flatten the summary into named text sections — the source of the
    /// topic section map. Rebuilding twice from the same summary yields
    /// identical text.
    pub fn to_sections(&self, include_outcome_reasons: bool) -> Vec<(&'static str, String)> {
        let mut sections = Vec::new();

        push_section(&mut sections, "facts", &[("Fact", &self.facts)]);
        push_section(&mut sections, "issues", &[("Issue", &self.issues)]);
        push_section(
            &mut sections,
            "property_division",
            &[
                ("Asset Pool", &self.property.asset_pool),
                ("Contributions", &self.property.contributions),
                ("Future Needs", &self.property.future_needs),
                ("Just & Equitable", &self.property.just_equitable),
                ("Living Arrangements", &self.property.living_arrangements),
                ("Existing Agreements", &self.property.existing_agreements),
            ],
        );
        push_section(
            &mut sections,
            "spousal_maintenance",
            &[
                ("Need", &self.spousal_maintenance.need),
                ("Capacity to Pay", &self.spousal_maintenance.capacity_to_pay),
                ("Statutory Factors", &self.spousal_maintenance.statutory_factors),
                ("Income & Expenses", &self.spousal_maintenance.income_expenses),
                ("Earning Capacity", &self.spousal_maintenance.earning_capacity),
                ("Health Care", &self.spousal_maintenance.health_care),
                ("Relationship Length", &self.spousal_maintenance.relationship_length),
                ("Standard of Living", &self.spousal_maintenance.standard_of_living),
            ],
        );
        push_section(
            &mut sections,
            "children_parenting",
            &[
                ("Child Ages", &self.parenting.child_ages),
                ("Current Arrangements", &self.parenting.current_arrangements),
                ("Caregiver History", &self.parenting.caregiver_history),
                ("Availability", &self.parenting.availability),
                ("Safety Concerns", &self.parenting.safety_concerns),
                ("Child Views", &self.parenting.child_views),
                ("Allegations", &self.parenting.allegations),
                ("Expert Evidence", &self.parenting.expert_evidence),
                ("Best Interests", &self.parenting.best_interests),
                ("Orders", &self.parenting.orders),
            ],
        );
        push_section(
            &mut sections,
            "family_violence_safety",
            &[
                ("Incidents", &self.family_violence_safety.incidents),
                ("Protection Orders", &self.family_violence_safety.protection_orders),
                ("Police & Court", &self.family_violence_safety.police_court),
                ("Child Exposure", &self.family_violence_safety.child_exposure),
                ("Safety Plan", &self.family_violence_safety.safety_plan),
            ],
        );
        push_section(
            &mut sections,
            "prenup_postnup",
            &[
                ("Agreement Date", &self.prenup_postnup.agreement_date),
                ("Legal Advice", &self.prenup_postnup.legal_advice),
                ("Financial Disclosure", &self.prenup_postnup.financial_disclosure),
                ("Pressure/Duress", &self.prenup_postnup.pressure_duress),
                ("Changed Circumstances", &self.prenup_postnup.changed_circumstances),
            ],
        );

        if include_outcome_reasons {
            if let Some(outcome) = &self.outcome_orders {
                push_section(&mut sections, "outcome_orders", &[("Outcome", outcome)]);
            }
            push_section(
                &mut sections,
                "reasons_rationale",
                &[("Reasons", &self.reasons_rationale)],
            );
        }

        push_section(
            &mut sections,
            "impact_analysis",
            &[
                ("Pivotal Finding", &self.impact_analysis.pivotal_findings),
                ("Statutory Pivot", &self.impact_analysis.statutory_pivots),
            ],
        );
        push_section(&mut sections, "uncertainties", &[("Uncertainties", &self.uncertainties)]);

        if let Some(raw) = &self.raw_summary {
            if !raw.trim().is_empty() {
                sections.push(("raw_summary", format!("- RawSummary: {}", raw.trim())));
            }
        }

        sections
    }

    /// The flattened text for one topic's section, or empty when nothing is
    /// recorded under it.
    pub fn topic_section_text(&self, topic: Topic) -> String {
        self.to_sections(true)
            .into_iter()
            .find(|(section, _)| *section == topic.as_str())
            .map(|(_, text)| text)
            .unwrap_or_default()
    }

    pub fn rendered_text(&self) -> String {
        self.to_sections(true)
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn push_section(
    sections: &mut Vec<(&'static str, String)>,
    name: &'static str,
    parts: &[(&str, &FieldValue)],
) {
    let mut lines = Vec::new();
    for (label, field) in parts {
        for item in field.items() {
            lines.push(format!("- {}: {}", label, item));
        }
    }
    if !lines.is_empty() {
        sections.push((name, lines.join("\n")));
    }
}

/// Parse a stored summary. Anything that is not a valid JSON object degrades
/// to a placeholder structure carrying an excerpt and an uncertainty note,
/// so downstream never sees a malformed document.
pub fn parse_summary(raw: &str) -> CaseSummary {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<CaseSummary>(cleaned) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(error = %e, "Stored case summary is not valid JSON; using placeholder");
            CaseSummary::placeholder(
                Some(excerpt(raw, 2000)),
                "Summary JSON parse failed; using raw excerpt.",
            )
        }
    }
}

pub fn serialize_summary(summary: &CaseSummary) -> String {
    serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
}

/// Generate a fresh structured summary from a case narrative with one
/// completion call. Never fails hard: generation or parse errors degrade to
/// the annotated placeholder, and the word budget is enforced by list caps
/// plus largest-list shrinking.
pub async fn generate(
    llm: &dyn CompletionProvider,
    case_text: &str,
    config: &SummaryConfig,
) -> CaseSummary {
    let case_text = case_text.trim();
    let prompt = templates::case_summary_prompt(case_text, config.target_words, config.max_words);

    let mut summary = match llm.complete(&prompt).await {
        Ok(raw) => {
            let cleaned = strip_code_fences(&raw);
            match serde_json::from_str::<CaseSummary>(cleaned) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "Summary completion was not valid JSON");
                    CaseSummary::placeholder(
                        Some(excerpt(case_text, config.raw_excerpt_chars)),
                        "Summary JSON parse failed; using raw excerpt.",
                    )
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Summary generation call failed");
            CaseSummary::placeholder(
                Some(excerpt(case_text, config.raw_excerpt_chars)),
                "Summary generation failed; using raw excerpt.",
            )
        }
    };

    summary.apply_list_limits(&PRIMARY_LIST_LIMITS);
    if word_count(&summary.rendered_text()) > config.max_words {
        summary.apply_list_limits(&FALLBACK_LIST_LIMITS);
        summary.shrink_to_max_words(config.max_words);
    }

    // Uploaded narratives are often hypotheticals. Without evidence of an
    // actual judgment, keep `outcome_orders` null so a predicted outcome is
    // never stored as if it were ordered.
    if !looks_like_decided_case(case_text) {
        summary.outcome_orders = None;
    }

    summary
}

pub fn word_count(text: &str) -> usize {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let re = WORD.get_or_init(|| Regex::new(r"\b\w+(?:'\w+)?\b").expect("static word pattern"));
    re.find_iter(text).count()
}

/// Heuristic for "this text contains an actual judgment": a neutral citation
/// (`[YYYY] Abc 12`) or one of the decided-outcome markers.
pub fn looks_like_decided_case(text: &str) -> bool {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    let re = CITATION.get_or_init(|| {
        Regex::new(r"\[\d{4}\]\s*[a-z]{2,}\s*\d+").expect("static citation pattern")
    });

    let lowered = text.to_lowercase();
    if re.is_match(&lowered) {
        return true;
    }
    const DECIDED_MARKERS: &[&str] = &[
        "final orders",
        "orders made",
        "the court orders",
        "the court ordered",
        "it is ordered",
        "judgment",
        "reasons for judgment",
        "appeal allowed",
        "appeal dismissed",
        "orders of the court",
        "held that",
    ];
    DECIDED_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_normalizes_null_string_and_list() {
        let summary: CaseSummary = serde_json::from_str(
            r#"{"facts": "single fact", "issues": null, "parties": ["A", "", "B"]}"#,
        )
        .unwrap();
        assert_eq!(summary.facts.items(), ["single fact"]);
        assert!(summary.issues.is_empty());
        assert_eq!(summary.parties.items(), ["A", "B"]);
    }

    #[test]
    fn null_outcome_orders_is_distinct_from_empty() {
        let undecided: CaseSummary =
            serde_json::from_str(r#"{"outcome_orders": null}"#).unwrap();
        assert!(undecided.outcome_orders.is_none());

        let decided_no_orders: CaseSummary =
            serde_json::from_str(r#"{"outcome_orders": []}"#).unwrap();
        assert!(matches!(decided_no_orders.outcome_orders, Some(FieldValue::Empty)));

        let round_trip = serialize_summary(&undecided);
        assert!(round_trip.contains("\"outcome_orders\":null"));
    }

    #[test]
    fn parse_failure_yields_annotated_placeholder() {
        let summary = parse_summary("this is not json {{{");
        assert!(!summary.uncertainties.is_empty());
        assert!(summary.uncertainties.items()[0].contains("parse failed"));
        assert!(!summary.facts.is_empty());
    }

    #[test]
    fn list_limits_cap_each_field() {
        let mut summary = CaseSummary::default();
        for i in 0..30 {
            summary.facts.push(format!("fact {}", i));
            summary.prenup_postnup.agreement_date.push(format!("date {}", i));
        }
        summary.apply_list_limits(&PRIMARY_LIST_LIMITS);
        assert_eq!(summary.facts.len(), 16);
        assert_eq!(summary.prenup_postnup.agreement_date.len(), 2);
    }

    #[test]
    fn section_rebuild_is_idempotent() {
        let mut summary = CaseSummary::default();
        summary.property.asset_pool.push("Matrimonial home: $1,200,000");
        summary.property.contributions.push("Mother was primary caregiver");

        let first = summary.topic_section_text(Topic::PropertyDivision);
        let second = summary.topic_section_text(Topic::PropertyDivision);
        assert_eq!(first, second);
        assert!(first.contains("- Asset Pool: Matrimonial home: $1,200,000"));
    }

    #[test]
    fn patching_appends_never_replaces() {
        let mut summary = CaseSummary::default();
        summary.property.asset_pool.push("existing entry");
        let before = summary.topic_section_text(Topic::PropertyDivision);

        assert!(summary.append_factor(Topic::PropertyDivision, "asset_pool", "$1.2M home"));
        let after = summary.topic_section_text(Topic::PropertyDivision);

        assert!(after.starts_with(&before));
        assert!(after.contains("$1.2M home"));
        assert_eq!(summary.property.asset_pool.len(), 2);
    }

    #[test]
    fn unknown_factor_is_rejected() {
        let mut summary = CaseSummary::default();
        assert!(!summary.append_factor(Topic::PropertyDivision, "no_such_field", "x"));
        assert!(!summary.append_factor(Topic::Other, "asset_pool", "x"));
    }

    #[test]
    fn shrink_drops_from_largest_lists_first() {
        let mut summary = CaseSummary::default();
        for i in 0..10 {
            summary.facts.push(format!("a long descriptive fact number {}", i));
        }
        summary.issues.push("only issue");
        summary.shrink_to_max_words(20);

        assert!(word_count(&summary.rendered_text()) <= 20 || summary.facts.len() == 1);
        assert_eq!(summary.issues.len(), 1);
    }

    #[test]
    fn decided_case_detection() {
        assert!(looks_like_decided_case("In the matter [2023] FedCFamC1F 123"));
        assert!(looks_like_decided_case("The Court orders that the property be sold."));
        assert!(!looks_like_decided_case(
            "We separated last year and cannot agree on the house."
        ));
    }

    #[tokio::test]
    async fn generate_nulls_outcome_for_undecided_narratives() {
        use crate::testutil::KeyedCompletion;

        let llm = KeyedCompletion::new(vec![(
            "STRICT JSON",
            r#"{"facts": ["separated in 2022"], "outcome_orders": ["50/50 split ordered"]}"#,
        )]);
        let summary = generate(
            &llm,
            "We separated in 2022 and disagree about the house.",
            &SummaryConfig::default(),
        )
        .await;
        assert!(summary.outcome_orders.is_none());
        assert_eq!(summary.facts.items(), ["separated in 2022"]);
    }

    #[tokio::test]
    async fn generate_degrades_to_placeholder_on_failure() {
        use crate::testutil::FailingCompletion;

        let summary = generate(&FailingCompletion, "some narrative", &SummaryConfig::default()).await;
        assert!(summary.uncertainties.items()[0].contains("generation failed"));
        assert_eq!(summary.facts.items(), ["some narrative"]);
    }
}

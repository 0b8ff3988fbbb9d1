//! Prompt templates for the completion service. Content here is a
//! collaborator concern: the core only guarantees which context blocks are
//! assembled and the output contract (answer, separator, condensed summary).

use crate::topics::Topic;

/// Separator between the user-visible answer and the condensed summary kept
/// for conversation memory.
pub const CACHE_SUMMARY_SEPARATOR: &str = "---CACHE_SUMMARY---";

/// Placeholder stored in history when the model omits the separator.
pub const SUMMARY_NOT_AVAILABLE: &str = "Summary not available.";

pub fn classify_prompt(question: &str) -> String {
    let vocabulary: Vec<&str> = Topic::ALL.iter().map(|t| t.as_str()).collect();
    format!(
        "Based on the following user question, which legal topic does it belong to?\n\
         Question: \"{}\"\n\n\
         Topics: {:?}\n\n\
         Return only the topic name, or 'other' if it doesn't fit.",
        question, vocabulary
    )
}

pub fn field_summary_prompt(text: &str, max_words: usize) -> String {
    format!(
        "Summarize the following text to {} words or fewer. \
         Keep concrete facts, dates, amounts, and parties. \
         Return only the summary.\n\nTEXT:\n{}",
        max_words, text
    )
}

pub fn case_summary_prompt(case_text: &str, target_words: usize, max_words: usize) -> String {
    format!(
        "You are a legal analyst specializing in Australian family law.\n\
         Read the provided case text and produce a STRICT JSON summary for retrieval.\n\n\
         OUTPUT RULES:\n\
         - Output ONLY valid JSON. No markdown, no commentary.\n\
         - Use double quotes for all keys and string values.\n\
         - If a field is not stated, use an empty list or empty string.\n\
         - Do not invent details. Do not quote long passages.\n\
         - If the text does NOT contain actual court orders or a decided outcome, set \"outcome_orders\" to null.\n\
         - Target around {target} words when rendered to text; allow up to {max} for complex cases.\n\n\
         TOPICS TO COVER:\n\
         - property: asset_pool, contributions (include domestic/caregiver details), future_needs, just_equitable, living_arrangements, existing_agreements\n\
         - parenting: child_ages, current_arrangements, caregiver_history, availability, safety_concerns, child_views, allegations, expert_evidence, best_interests, orders\n\
         - spousal_maintenance: need, capacity_to_pay, statutory_factors, income_expenses, earning_capacity, health_care, relationship_length, standard_of_living\n\
         - family_violence_safety: incidents, protection_orders, police_court, child_exposure, safety_plan\n\
         - prenup_postnup: agreement_date, legal_advice, financial_disclosure, pressure_duress, changed_circumstances\n\
         - impact_analysis: pivotal_findings (key factual determinations, or the factual battlegrounds if undecided), statutory_pivots (sections of the Family Law Act critical to the outcome)\n\n\
         Also provide top-level keys: case_name, court, date, parties, issues, facts, outcome_orders, reasons_rationale, uncertainties.\n\
         All list values are lists of short strings, one point per item.\n\n\
         INPUT:\n{case_text}",
        target = target_words,
        max = max_words,
        case_text = case_text
    )
}

pub struct AnswerPromptInputs<'a> {
    pub question: &'a str,
    pub statute_context: &'a str,
    pub case_section_text: &'a str,
    pub impact_analysis: &'a str,
    pub history_text: &'a str,
    pub precedent_context: &'a str,
    pub topic: Topic,
}

/// Final synthesis prompt. The fixed output contract — structured answer,
/// separator token, condensed machine-readable summary — is what the
/// assembler splits on.
pub fn answer_prompt(inputs: &AnswerPromptInputs<'_>) -> String {
    let impact_block = if inputs.impact_analysis.is_empty() {
        "No specific impact analysis provided for this case."
    } else {
        inputs.impact_analysis
    };

    format!(
        "ROLE: Senior Australian Family Law Specialist.\n\n\
         STATUTORY BASIS:\n{statutes}\n\n\
         CLIENT'S CURRENT CASE FACTS:\n{case_facts}\n\n\
         CLIENT'S CURRENT CASE IMPACT ANALYSIS:\n{impact}\n\n\
         CHAT HISTORY CONTEXT:\n{history}\n\n\
         RELEVANT PRECEDENTS & IMPACT ANALYSIS:\n{precedents}\n\n\
         USER QUESTION: {question}\n\n\
         INSTRUCTIONS:\n\
         Provide a comprehensive legal analysis in the following structured format:\n\n\
         ## Direct Answer\n\
         A concise summary of the legal position addressing the question directly.\n\n\
         ## Similar Decided Cases\n\
         For each precedent provided above, explain the judicial reasoning, how the judge \
         linked facts to a legal outcome, and its strategic impact.\n\n\
         ## Likely Assessment\n\
         - {instruction}\n\
         - Predict the likely range of outcomes based on the client's specific facts.\n\
         - Be specific about percentages, orders, or arrangements where appropriate.\n\n\
         ## Uncertainties & Missing Information\n\
         Identify what facts are missing that would significantly shift this prediction.\n\
         If the provided context is insufficient, state so plainly rather than inventing facts.\n\n\
         {separator}\n\
         [Provide a technical summary of this advice for conversation memory]",
        statutes = inputs.statute_context,
        case_facts = inputs.case_section_text,
        impact = impact_block,
        history = inputs.history_text,
        precedents = inputs.precedent_context,
        question = inputs.question,
        instruction = inputs.topic.instruction(),
        separator = CACHE_SUMMARY_SEPARATOR,
    )
}

/// Prompt for the general Q&A path, answered from retrieved context only.
pub fn qa_prompt(context_count: usize, context: &str, query: &str) -> String {
    format!(
        "You are an Australian case law assistant.\n\
         Follow these rules strictly:\n\
         1) Answer using ONLY the provided case law context snippets.\n\
         2) Do NOT use any external knowledge or assumptions.\n\
         3) If the context does NOT contain enough information, clearly state that the \
         answer cannot be determined from the provided materials.\n\
         4) Base your reasoning explicitly on the context.\n\
         5) Do NOT provide legal advice. This is for informational purposes only.\n\n\
         Case law context snippets (total={}):\n{}\n\n\
         Question: {}",
        context_count, context, query
    )
}

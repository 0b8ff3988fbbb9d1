//! Listwise LLM re-ranking of merged retrieval candidates.
//!
//! The fused scores from two retrieval arms are comparable enough for
//! thresholding but not for fine-grained ordering, so when re-ranking is
//! enabled a single completion call judges relevance to the original
//! question and returns a globally consistent order. Falls back to the fused
//! order on any failure: unavailable provider, timeout, or unparseable
//! output.

use std::collections::HashSet;

use crate::llm::CompletionProvider;
use crate::types::RetrievedNode;

const MAX_CANDIDATES: usize = 15;
const SNIPPET_CHARS: usize = 300;

/// Re-rank candidates with one listwise completion call. The prompt shows
/// numbered snippets and asks for a JSON array of numbers, most relevant
/// first. Candidates beyond `MAX_CANDIDATES` keep their tail position.
pub async fn llm_rerank(
    llm: &dyn CompletionProvider,
    query: &str,
    nodes: Vec<RetrievedNode>,
    timeout_secs: u64,
) -> Vec<RetrievedNode> {
    if nodes.len() <= 1 {
        return nodes;
    }

    let judged = nodes.len().min(MAX_CANDIDATES);
    let snippets = nodes
        .iter()
        .take(judged)
        .enumerate()
        .map(|(i, node)| {
            let preview: String = node.text.chars().take(SNIPPET_CHARS).collect();
            format!("[{}] {}", i + 1, preview)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Rank the following numbered passages by how relevant they are to the question.\n\n\
         Question: \"{}\"\n\n\
         Passages:\n{}\n\n\
         Reply with ONLY a JSON array containing all {} passage numbers, \
         most relevant first. Example: [2, 1, 3]",
        query, snippets, judged
    );

    let raw = match tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        llm.complete(&prompt),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Rerank call failed, keeping fused order");
            return nodes;
        }
        Err(_) => {
            tracing::warn!(timeout_secs, "Rerank call timed out, keeping fused order");
            return nodes;
        }
    };

    match parse_ranking(&raw, judged) {
        Some(order) => apply_ranking(nodes, &order),
        None => {
            tracing::warn!(
                output = %raw.chars().take(200).collect::<String>(),
                "Could not parse rerank output, keeping fused order"
            );
            nodes
        }
    }
}

/// Parse the model output into zero-based candidate positions.
///
/// Tries, in order: the whole output as a JSON array; the first bracketed
/// substring; bare integer extraction (accepted when at least half of the
/// expected numbers are present).
fn parse_ranking(output: &str, expected: usize) -> Option<Vec<usize>> {
    let trimmed = output
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Some(order) = try_parse_array(trimmed, expected) {
        return Some(order);
    }

    if let Some(start) = trimmed.find('[') {
        if let Some(len) = trimmed[start..].find(']') {
            if let Some(order) = try_parse_array(&trimmed[start..=start + len], expected) {
                return Some(order);
            }
        }
    }

    let mut seen = HashSet::new();
    let numbers: Vec<usize> = trimmed
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= expected)
        .filter(|&n| seen.insert(n))
        .map(|n| n - 1)
        .collect();

    if numbers.len() >= expected.div_ceil(2) {
        Some(numbers)
    } else {
        None
    }
}

fn try_parse_array(candidate: &str, expected: usize) -> Option<Vec<usize>> {
    let indices: Vec<usize> = serde_json::from_str(candidate).ok()?;
    if indices.is_empty() || indices.iter().any(|&i| i < 1 || i > expected) {
        return None;
    }
    Some(indices.into_iter().map(|i| i - 1).collect())
}

/// Reorder candidates by the parsed ranking. Positions the model did not
/// mention (or beyond the judged window) are appended in their original
/// relative order.
fn apply_ranking(mut nodes: Vec<RetrievedNode>, order: &[usize]) -> Vec<RetrievedNode> {
    let mut used: HashSet<usize> = HashSet::new();
    let mut reordered = Vec::with_capacity(nodes.len());

    for &position in order {
        if position < nodes.len() && used.insert(position) {
            reordered.push(nodes[position].clone());
        }
    }
    for (position, node) in nodes.drain(..).enumerate() {
        if !used.contains(&position) {
            reordered.push(node);
        }
    }
    reordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn node(id: &str) -> RetrievedNode {
        RetrievedNode {
            id: id.to_string(),
            text: format!("passage {}", id),
            metadata: HashMap::new(),
            score: 0.5,
        }
    }

    #[test]
    fn parses_clean_json() {
        assert_eq!(parse_ranking("[3, 1, 2]", 3).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn parses_fenced_json() {
        assert_eq!(parse_ranking("```json\n[2, 1, 3]\n```", 3).unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn parses_array_embedded_in_prose() {
        let output = "Ranked by relevance: [3, 1, 2]. Hope that helps.";
        assert_eq!(parse_ranking(output, 3).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn falls_back_to_integer_extraction() {
        let output = "First 3, then 1, then 2.";
        assert_eq!(parse_ranking(output, 3).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_ranking("no ranking here", 5).is_none());
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert!(parse_ranking("[9, 1]", 3).is_none());
    }

    #[test]
    fn accepts_partial_ranking_over_half() {
        assert_eq!(parse_ranking("[2, 4, 1]", 5).unwrap(), vec![1, 3, 0]);
    }

    #[test]
    fn apply_ranking_appends_unmentioned_tail() {
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let reordered = apply_ranking(nodes, &[2, 0]);
        let ids: Vec<&str> = reordered.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn apply_ranking_ignores_duplicates() {
        let nodes = vec![node("a"), node("b")];
        let reordered = apply_ranking(nodes, &[1, 1, 0]);
        let ids: Vec<&str> = reordered.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}

use thiserror::Error;

/// Client-facing errors surfaced by the engine.
///
/// Identity and state errors are explicit rejections; everything else the
/// engine recovers from locally (degraded retrieval, parse fallbacks,
/// truncated summaries) and never surfaces as failure. The one exception is
/// final answer synthesis: there is no substitute for it, so it propagates.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("case {0} not found")]
    CaseNotFound(i64),

    #[error("no pending clarification for case {0}")]
    NoPendingClarification(i64),

    #[error("answer synthesis failed: {0}")]
    Completion(#[source] anyhow::Error),

    #[error("case store operation failed: {0}")]
    Store(#[source] anyhow::Error),
}

//! Query rewriting after a failed grade.

use crate::prompts::PromptSet;
use colloquy_core::{AppError, AppResult};
use colloquy_llm::{LlmRequest, ProviderRegistry};
use serde_json::json;

/// Produce a better search query from the prior one and the grader's
/// failure reason.
///
/// Deliberately has no fallback: a failure here aborts the current retry
/// attempt and the correction loop falls back to the last-known answer.
pub async fn rewrite_query(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    prior_query: &str,
    failure_reason: &str,
    provider: Option<&str>,
) -> AppResult<String> {
    let prompt = prompts.render(
        "rewrite",
        &json!({
            "question": prior_query,
            "reason": failure_reason,
        }),
    )?;

    let rewritten = registry
        .complete("rewrite", provider, LlmRequest::new(prompt))
        .await?;

    let rewritten = rewritten.trim().to_string();
    if rewritten.is_empty() {
        return Err(AppError::Engine(
            "Rewriter returned an empty query".to_string(),
        ));
    }

    tracing::info!("Rewrote query: '{}' -> '{}'", prior_query, rewritten);
    Ok(rewritten)
}

//! Query contextualization against conversation memory.

use crate::prompts::PromptSet;
use colloquy_llm::{LlmRequest, ProviderRegistry};
use colloquy_memory::types::render_transcript;
use colloquy_memory::ChatTurn;
use serde_json::json;

/// Rewrite a follow-up question into a standalone query.
///
/// With no prior turns the message is returned unchanged without a model
/// call; first turns are already standalone, and the skip saves a round
/// trip on every fresh conversation. Fail-open: model failure falls back to
/// the original message so contextualization can never block the pipeline.
pub async fn contextualize_query(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    history: &[ChatTurn],
    provider: Option<&str>,
) -> String {
    if history.is_empty() {
        return query.to_string();
    }

    let prompt = match prompts.render(
        "contextualize",
        &json!({
            "history_str": render_transcript(history),
            "query": query,
        }),
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!("Contextualize prompt rendering failed: {}", e);
            return query.to_string();
        }
    };

    match registry
        .complete(
            "contextualize",
            provider,
            LlmRequest::new(prompt).with_temperature(0.0),
        )
        .await
    {
        Ok(rewritten) => {
            let rewritten = rewritten.trim().to_string();
            if rewritten.is_empty() {
                return query.to_string();
            }
            tracing::info!("Contextualized query: '{}' -> '{}'", query, rewritten);
            rewritten
        }
        Err(e) => {
            tracing::warn!("Contextualization failed: {}", e);
            query.to_string()
        }
    }
}

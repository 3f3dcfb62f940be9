//! HyDE query expansion.
//!
//! Short keyword-style queries embed poorly against prose documents, so the
//! retriever can embed a model-generated hypothetical answer instead.
//! Truthfulness is irrelevant here; only semantic proximity to the
//! question matters.

use crate::prompts::PromptSet;
use colloquy_llm::{LlmRequest, ProviderRegistry};
use serde_json::json;

/// Generate a hypothetical passage answering the query.
///
/// Fail-open: any model failure returns the original query unchanged.
pub async fn generate_hypothetical_answer(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    provider: Option<&str>,
) -> String {
    let prompt = match prompts.render("hyde", &json!({ "query": query })) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!("HyDE prompt rendering failed: {}", e);
            return query.to_string();
        }
    };

    match registry
        .complete("rag_search", provider, LlmRequest::new(prompt))
        .await
    {
        Ok(passage) => {
            let passage = passage.trim().to_string();
            if passage.is_empty() {
                return query.to_string();
            }
            tracing::debug!("HyDE expansion: '{}' -> '{}'", query, passage);
            passage
        }
        Err(e) => {
            tracing::warn!("HyDE generation failed: {}", e);
            query.to_string()
        }
    }
}

//! Intent classification: retrieval, small talk, or human handoff.

use crate::json::parse_model_json;
use crate::prompts::PromptSet;
use crate::types::IntentDecision;
use colloquy_llm::{LlmRequest, ProviderRegistry};
use serde_json::json;

/// Classify the standalone query into a routing decision.
///
/// The model is asked for strict JSON; anything unusable falls back to the
/// conservative decision (`requires_rag = true`, `requires_human = false`)
/// so a classifier outage can never silently drop a real question.
pub async fn classify_intent(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    provider: Option<&str>,
) -> IntentDecision {
    let prompt = match prompts.render("intent", &json!({ "query": query })) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!("Intent prompt rendering failed: {}", e);
            return IntentDecision::fallback();
        }
    };

    let raw = match registry
        .complete(
            "intent",
            provider,
            LlmRequest::new(prompt).with_temperature(0.0),
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Intent classification call failed: {}", e);
            return IntentDecision::fallback();
        }
    };

    match parse_model_json::<IntentDecision>(&raw) {
        Ok(decision) => {
            tracing::info!(
                "Intent: rag={} human={} complexity={} pricing={} ({})",
                decision.requires_rag,
                decision.requires_human,
                decision.complexity_score,
                decision.pricing_intent,
                decision.reason
            );
            decision
        }
        Err(e) => {
            tracing::warn!("Intent output unparseable ({}); using fallback", e);
            IntentDecision::fallback()
        }
    }
}

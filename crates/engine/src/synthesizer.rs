//! Answer synthesis: context assembly, prompt construction, handoff
//! detection.

use crate::prompts::PromptSet;
use crate::types::RetrievalCandidate;
use colloquy_llm::{LlmRequest, ProviderRegistry};
use serde_json::json;

/// Returned when the generation model itself fails.
pub const FALLBACK_ANSWER: &str = "Sorry, I encountered an error generating the answer.";

/// Returned when the handoff-message model call fails.
const FALLBACK_HANDOFF: &str =
    "I understand. I am notifying a human agent to take over this conversation.";

/// Tag the model appends when the conversation should be escalated.
const HANDOFF_TAG: &str = "[HANDOFF]";

/// Placeholder context when neither retrieval nor live data produced
/// anything; keeps the prompt honest so the model says it doesn't know.
const EMPTY_CONTEXT: &str = "No relevant documents or live data found.";

/// Assemble the context block: supplemental live data first (highest
/// authority), then retrieved chunks labeled by source.
pub fn build_context(candidates: &[RetrievalCandidate], external: Option<&str>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(live) = external {
        if !live.trim().is_empty() {
            sections.push(format!("[LIVE DATA]\n{}", live.trim()));
        }
    }

    if !candidates.is_empty() {
        let docs = candidates
            .iter()
            .map(|c| format!("Source: {}\n{}", c.filename, c.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        sections.push(docs);
    }

    if sections.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        sections.join("\n\n")
    }
}

/// Language instruction derived from the tenant's preferred-language hint.
///
/// The hint is only a tiebreaker; the user's own language always wins.
pub fn language_instruction(preferred: Option<&str>) -> String {
    match preferred {
        Some(langs) if !langs.trim().is_empty() => format!(
            "Preferred languages: {} (prioritize these only if the user's language is ambiguous).",
            langs.trim()
        ),
        _ => String::new(),
    }
}

/// Strip the handoff tag and report whether it was present.
///
/// This is the second, cheaper chance to catch escalation triggers the
/// intent classifier missed (e.g. the user agreed to a purchase mid-flow).
pub fn detect_handoff(answer: &str) -> (String, bool) {
    if answer.contains(HANDOFF_TAG) {
        let cleaned = answer.replace(HANDOFF_TAG, "").trim().to_string();
        (cleaned, true)
    } else {
        (answer.trim().to_string(), false)
    }
}

/// Synthesize a grounded answer from context and history.
///
/// `step` selects the generation route ("generation" or
/// "complex_reasoning"). Model failure degrades to a fixed apologetic
/// answer rather than propagating the error.
#[allow(clippy::too_many_arguments)]
pub async fn synthesize_answer(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    step: &str,
    query: &str,
    context: &str,
    history: &str,
    lang_instruction: &str,
    provider: Option<&str>,
) -> String {
    let prompt = match prompts.render(
        "answer",
        &json!({
            "lang_instruction": lang_instruction,
            "history_str": history,
            "context_str": context,
            "query": query,
        }),
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::error!("Answer prompt rendering failed: {}", e);
            return FALLBACK_ANSWER.to_string();
        }
    };

    match registry
        .complete(step, provider, LlmRequest::new(prompt).with_temperature(0.3))
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Answer generation failed: {}", e);
            FALLBACK_ANSWER.to_string()
        }
    }
}

/// Synthesize a small-talk reply; history only, no retrieval plumbing.
pub async fn synthesize_small_talk(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    history: &str,
    lang_instruction: &str,
    provider: Option<&str>,
) -> String {
    let prompt = match prompts.render(
        "small_talk",
        &json!({
            "lang_instruction": lang_instruction,
            "history_str": history,
            "query": query,
        }),
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::error!("Small-talk prompt rendering failed: {}", e);
            return FALLBACK_ANSWER.to_string();
        }
    };

    match registry
        .complete(
            "generation",
            provider,
            LlmRequest::new(prompt).with_temperature(0.7),
        )
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Small-talk generation failed: {}", e);
            FALLBACK_ANSWER.to_string()
        }
    }
}

/// Produce the polite transfer message for an explicit handoff request.
pub async fn handoff_message(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    lang_instruction: &str,
    provider: Option<&str>,
) -> String {
    let prompt = match prompts.render(
        "handoff",
        &json!({
            "lang_instruction": lang_instruction,
            "query": query,
        }),
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::error!("Handoff prompt rendering failed: {}", e);
            return FALLBACK_HANDOFF.to_string();
        }
    };

    match registry
        .complete("generation", provider, LlmRequest::new(prompt))
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Handoff message generation failed: {}", e);
            FALLBACK_HANDOFF.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(filename: &str, content: &str) -> RetrievalCandidate {
        RetrievalCandidate {
            chunk_id: "id".to_string(),
            filename: filename.to_string(),
            content: content.to_string(),
            score: 0.1,
            rerank_score: None,
        }
    }

    #[test]
    fn test_build_context_orders_live_data_first() {
        let candidates = vec![candidate("refunds.md", "Our refund window is 30 days.")];
        let context = build_context(&candidates, Some("Widget: $10, in stock"));

        let live = context.find("[LIVE DATA]").unwrap();
        let docs = context.find("Source: refunds.md").unwrap();
        assert!(live < docs);
    }

    #[test]
    fn test_build_context_empty() {
        assert_eq!(build_context(&[], None), EMPTY_CONTEXT);
        // Whitespace-only live data does not count as context.
        assert_eq!(build_context(&[], Some("   ")), EMPTY_CONTEXT);
    }

    #[test]
    fn test_detect_handoff_strips_tag() {
        let (clean, handoff) =
            detect_handoff("Great! I will connect you with a specialist. [HANDOFF]");
        assert!(handoff);
        assert_eq!(clean, "Great! I will connect you with a specialist.");
    }

    #[test]
    fn test_detect_handoff_absent() {
        let (clean, handoff) = detect_handoff("The refund window is 30 days.");
        assert!(!handoff);
        assert_eq!(clean, "The refund window is 30 days.");
    }

    #[test]
    fn test_language_instruction() {
        assert!(language_instruction(None).is_empty());
        assert!(language_instruction(Some("  ")).is_empty());
        let instruction = language_instruction(Some("pt-BR, en"));
        assert!(instruction.contains("pt-BR, en"));
        assert!(instruction.contains("only if the user's language is ambiguous"));
    }
}

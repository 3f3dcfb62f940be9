//! Automated grading of synthesized answers.

use crate::json::parse_model_json;
use crate::prompts::PromptSet;
use crate::types::Grade;
use colloquy_llm::{LlmRequest, ProviderRegistry};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct RawGrade {
    score: i64,
    #[serde(default)]
    reason: String,
}

/// Grade an answer against its question and retrieved context.
///
/// Unusable grading output accepts the answer (`score = 1`): availability
/// over strictness; a grading-subsystem outage must not silently block
/// every answer.
pub async fn grade_answer(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    question: &str,
    context: &str,
    answer: &str,
    provider: Option<&str>,
) -> Grade {
    let prompt = match prompts.render(
        "grader",
        &json!({
            "context": context,
            "question": question,
            "answer": answer,
        }),
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!("Grader prompt rendering failed: {}", e);
            return Grade::accept_by_default();
        }
    };

    let raw = match registry
        .complete(
            "grading",
            provider,
            LlmRequest::new(prompt).with_temperature(0.0),
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Grading call failed: {}", e);
            return Grade::accept_by_default();
        }
    };

    match parse_model_json::<RawGrade>(&raw) {
        Ok(parsed) => {
            let grade = Grade {
                // Anything nonzero counts as a pass; the contract is 0|1.
                score: if parsed.score == 0 { 0 } else { 1 },
                reason: parsed.reason,
            };
            tracing::info!("Grade: {} ({})", grade.score, grade.reason);
            grade
        }
        Err(e) => {
            tracing::warn!("Grading output unparseable ({}); accepting answer", e);
            Grade::accept_by_default()
        }
    }
}

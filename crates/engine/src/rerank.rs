//! LLM-scored relevance reranking.
//!
//! One model call per candidate; the most expensive retrieval stage, which
//! is why it only runs when the caller opts in and only over the oversized
//! candidate pool, never the full corpus.

use crate::json::parse_model_json;
use crate::prompts::PromptSet;
use crate::types::RetrievalCandidate;
use colloquy_llm::{LlmRequest, ProviderRegistry};
use serde::Deserialize;
use serde_json::json;

/// Maximum candidate content length sent to the scoring model.
const PREVIEW_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
struct RerankVerdict {
    #[serde(default)]
    score: i64,
}

/// Score candidates 0-10 against the original query and keep the top-k.
///
/// A candidate whose score cannot be obtained is demoted to 0, not
/// discarded; it can still appear if nothing scores higher.
pub async fn rerank_candidates(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    mut candidates: Vec<RetrievalCandidate>,
    top_k: usize,
    provider: Option<&str>,
) -> Vec<RetrievalCandidate> {
    if candidates.is_empty() {
        return candidates;
    }

    tracing::info!("Reranking {} candidates for query: {}", candidates.len(), query);

    for candidate in &mut candidates {
        let preview = truncate_preview(&candidate.content, PREVIEW_LEN);
        let score = score_candidate(registry, prompts, query, preview, provider).await;
        candidate.rerank_score = Some(score);
    }

    // Stable sort keeps the fused order among equal scores.
    candidates.sort_by_key(|c| std::cmp::Reverse(c.rerank_score.unwrap_or(0)));
    candidates.truncate(top_k);
    candidates
}

async fn score_candidate(
    registry: &ProviderRegistry,
    prompts: &PromptSet,
    query: &str,
    preview: &str,
    provider: Option<&str>,
) -> i64 {
    let prompt = match prompts.render("rerank", &json!({ "query": query, "content": preview })) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!("Rerank prompt rendering failed: {}", e);
            return 0;
        }
    };

    let raw = match registry
        .complete("rag_search", provider, LlmRequest::new(prompt).with_temperature(0.0))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Rerank scoring call failed: {}", e);
            return 0;
        }
    };

    match parse_model_json::<RerankVerdict>(&raw) {
        Ok(verdict) => verdict.score.clamp(0, 10),
        Err(e) => {
            tracing::warn!("Rerank score unparseable ({}); demoting candidate", e);
            0
        }
    }
}

/// Truncate to a byte budget on a char boundary.
fn truncate_preview(content: &str, max_len: usize) -> &str {
    if content.len() <= max_len {
        return content;
    }
    let mut end = max_len;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

//! Hybrid retrieval: tenant-scoped semantic + lexical search fused with
//! reciprocal rank fusion.
//!
//! Every failure inside retrieval (embedding, either search leg) degrades to
//! an empty candidate set; the synthesizer handles "no context found", the
//! caller never sees an error.

use crate::hyde;
use crate::prompts::PromptSet;
use crate::rerank;
use crate::storage::{StoredChunk, TenantScope};
use crate::types::RetrievalCandidate;
use colloquy_llm::ProviderRegistry;
use std::collections::HashMap;

/// RRF constant: dampens the influence of top ranks so consensus between
/// lists outweighs a single first place.
const RRF_K: u32 = 60;

/// Multiplier for the candidate pool when reranking will narrow it down.
const RERANK_POOL_FACTOR: usize = 4;

/// Fuse two ranked id lists with reciprocal rank fusion.
///
/// Each id's fused score is the sum over the lists it appears in of
/// `1 / (rank + k)` with 1-based ranks. Ids present in both lists accumulate
/// both terms, which rewards consensus without requiring the raw scores to
/// share a scale. The output ordering is a deterministic function of the two
/// input rankings and `k` (ties break on id).
pub fn fuse_rankings(semantic: &[String], lexical: &[String], k: u32) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();

    for (index, id) in semantic.iter().enumerate() {
        let rank = index as u32 + 1;
        *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / f64::from(rank + k);
    }
    for (index, id) in lexical.iter().enumerate() {
        let rank = index as u32 + 1;
        *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / f64::from(rank + k);
    }

    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();

    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    fused
}

/// Run the hybrid retrieval pipeline for one query.
///
/// With `use_hyde`, the embedding is computed from a hypothetical answer
/// while the *original* query still drives lexical search and reranking.
/// With `use_rerank`, the candidate pool is oversized by
/// [`RERANK_POOL_FACTOR`] and narrowed back to `limit` by the reranker.
#[allow(clippy::too_many_arguments)]
pub async fn retrieve(
    registry: &ProviderRegistry,
    scope: &TenantScope<'_>,
    prompts: &PromptSet,
    query: &str,
    limit: usize,
    use_hyde: bool,
    use_rerank: bool,
    provider: Option<&str>,
) -> Vec<RetrievalCandidate> {
    let search_query = if use_hyde {
        hyde::generate_hypothetical_answer(registry, prompts, query, provider).await
    } else {
        query.to_string()
    };

    let query_embedding = match registry.embed(&search_query).await {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!("Query embedding failed: {}", e);
            return Vec::new();
        }
    };

    let candidate_limit = if use_rerank {
        limit * RERANK_POOL_FACTOR
    } else {
        limit
    };

    let semantic = match scope.semantic_search(&query_embedding, candidate_limit) {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("Semantic search failed: {}", e);
            Vec::new()
        }
    };

    let lexical = match scope.lexical_search(query, candidate_limit) {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("Lexical search failed: {}", e);
            Vec::new()
        }
    };

    tracing::debug!(
        "Hybrid search: {} semantic, {} lexical candidates (limit {})",
        semantic.len(),
        lexical.len(),
        candidate_limit
    );

    let mut chunks: HashMap<String, StoredChunk> = HashMap::new();
    let semantic_ids: Vec<String> = semantic
        .into_iter()
        .map(|(chunk, _distance)| {
            let id = chunk.id.clone();
            chunks.insert(id.clone(), chunk);
            id
        })
        .collect();
    let lexical_ids: Vec<String> = lexical
        .into_iter()
        .map(|chunk| {
            let id = chunk.id.clone();
            chunks.insert(id.clone(), chunk);
            id
        })
        .collect();

    let fused = fuse_rankings(&semantic_ids, &lexical_ids, RRF_K);

    let mut candidates: Vec<RetrievalCandidate> = fused
        .into_iter()
        .filter_map(|(id, score)| {
            chunks.remove(&id).map(|chunk| RetrievalCandidate {
                chunk_id: chunk.id,
                filename: chunk.filename,
                content: chunk.content,
                score,
                rerank_score: None,
            })
        })
        .collect();
    candidates.truncate(candidate_limit);

    if use_rerank && !candidates.is_empty() {
        // Rerank against the ORIGINAL query, not the HyDE expansion.
        candidates =
            rerank::rerank_candidates(registry, prompts, query, candidates, limit, provider).await;
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rrf_score_for_chunk_in_both_lists() {
        // Semantic rank 2 and lexical rank 5 -> 1/(2+k) + 1/(5+k).
        let fused = fuse_rankings(
            &ids(&["a", "b"]),
            &ids(&["c", "d", "e", "f", "b"]),
            RRF_K,
        );

        let score_b = fused.iter().find(|(id, _)| id == "b").unwrap().1;
        let expected = 1.0 / (2.0 + 60.0) + 1.0 / (5.0 + 60.0);
        assert!((score_b - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_score_single_list() {
        let fused = fuse_rankings(&ids(&["a"]), &[], RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_consensus_beats_single_top_rank() {
        // "b" appears in both lists at modest ranks; "a" leads only one.
        let fused = fuse_rankings(&ids(&["a", "b"]), &ids(&["b", "c"]), RRF_K);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn test_rrf_is_deterministic() {
        let semantic = ids(&["x", "y", "z"]);
        let lexical = ids(&["z", "w"]);

        let first = fuse_rankings(&semantic, &lexical, RRF_K);
        let second = fuse_rankings(&semantic, &lexical, RRF_K);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rrf_ties_break_on_id() {
        // Same ranks in disjoint lists -> equal scores; order must still be stable.
        let fused = fuse_rankings(&ids(&["b"]), &ids(&["a"]), RRF_K);
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");
    }
}

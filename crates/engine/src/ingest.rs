//! Document ingestion: chunk, embed, store.
//!
//! Only the chunking/embedding contract lives here; file-format handling
//! (PDF, OCR) belongs to the ingestion gateway, not this engine.

use crate::storage::TenantScope;
use colloquy_core::{AppError, AppResult};
use colloquy_llm::ProviderRegistry;

/// Split text into bounded-size, slightly overlapping chunks.
///
/// Character-based with UTF-8 boundary care; trailing fragments smaller
/// than 10% of the chunk size are dropped.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }

        let chunk = text[start..end].trim();

        // Skip trailing fragments that carry no useful context
        if chunk.len() < chunk_size / 10 && !chunks.is_empty() {
            break;
        }
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        let step = if chunk_size > overlap {
            chunk_size - overlap
        } else {
            chunk_size
        };

        let mut next_start = start + step;
        while next_start < text.len() && !text.is_char_boundary(next_start) {
            next_start += 1;
        }
        start = next_start;
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}

/// Chunk, embed, and insert a document for a tenant.
///
/// Returns the number of chunks stored. An embedding failure aborts the
/// ingestion; a partially embedded document would silently degrade
/// retrieval for this tenant.
pub async fn ingest_document(
    registry: &ProviderRegistry,
    scope: &TenantScope<'_>,
    filename: &str,
    content: &str,
    chunk_size: usize,
    overlap: usize,
) -> AppResult<u32> {
    tracing::info!(
        "Ingesting document '{}' for tenant {}",
        filename,
        scope.tenant_id()
    );

    let chunks = chunk_text(content, chunk_size, overlap);
    if chunks.is_empty() {
        return Err(AppError::Engine(format!(
            "No content to ingest for '{}'",
            filename
        )));
    }

    let mut stored = 0u32;
    for chunk in &chunks {
        let embedding = registry.embed(chunk).await?;
        scope.insert_chunk(filename, chunk, &embedding)?;
        stored += 1;
    }

    tracing::info!("Ingested '{}' as {} chunks", filename, stored);
    Ok(stored)
}

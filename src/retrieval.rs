//! Query-time retrieval and ranking.
//!
//! [`retrieve`] embeds the query, runs the vector index, drops hits below
//! the score threshold, and resolves each surviving chunk to its owning
//! document. [`search`] wraps that into the result view the callers render,
//! with word-boundary snippets.
//!
//! A sparse corpus is not an error: anything that fails to clear the
//! threshold simply yields an empty result set. Only an unreachable
//! embedding backend surfaces as an error, and that failure is not retried
//! at this level.

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::error::{EngineError, EngineResult};
use crate::index::VectorIndex;
use crate::models::{Chunk, Document, SearchResult};
use crate::store::DocumentStore;

/// A ranked chunk hit with its owning document resolved.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub document: Document,
    pub score: f32,
}

/// Retrieve the top `k` chunks scoring at least `min_score` for a query.
///
/// Hits whose chunk or document has vanished between index lookup and
/// store resolution are skipped, so a result never points at deleted data.
pub async fn retrieve(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
    min_score: f32,
) -> EngineResult<Vec<RetrievedChunk>> {
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_vector = embed_query(embedder, query)
        .await
        .map_err(EngineError::embedding_unavailable)?;

    let mut retrieved = Vec::new();
    for hit in index.query(&query_vector, k) {
        if hit.score < min_score {
            continue;
        }
        let Some(chunk) = store.get_chunk(&hit.chunk_id).await? else {
            continue;
        };
        let Some(document) = store.get_document(&hit.document_id).await? else {
            continue;
        };
        retrieved.push(RetrievedChunk {
            chunk,
            document,
            score: hit.score,
        });
    }
    Ok(retrieved)
}

/// Execute a search and shape the hits for display.
pub async fn search(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    config: &RetrievalConfig,
    query: &str,
) -> EngineResult<Vec<SearchResult>> {
    let retrieved = retrieve(
        store,
        index,
        embedder,
        query,
        config.search_limit,
        config.min_score,
    )
    .await?;

    Ok(retrieved
        .into_iter()
        .map(|r| SearchResult {
            document_id: r.document.id,
            title: r.document.title,
            origin: r.document.origin,
            score: r.score,
            content_snippet: snippet(&r.chunk.text, config.snippet_chars),
        })
        .collect())
}

/// Truncate to at most `max_chars` characters, backing up to the last
/// whitespace so words are not cut mid-way. Falls back to a hard cut when
/// the limit lands inside one unbroken run.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let mut end = max_chars;
    // Next char continues a word: back up to the preceding break.
    if !chars[end].is_whitespace() {
        if let Some(pos) = (0..end).rev().find(|&i| chars[i].is_whitespace()) {
            end = pos;
        }
    }
    chars[..end].iter().collect::<String>().trim_end().to_string()
}

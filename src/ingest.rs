//! Ingestion pipeline: normalize, chunk, persist, embed.
//!
//! All capture paths (typed notes, web clips, voice transcripts, watched
//! files) funnel through [`ingest`]. Persistence is the commit point:
//! a document whose chunks could not be embedded is still stored, its
//! chunks stay pending, and [`embed_pending`] backfills them later.
//! Embedding failure is therefore logged, never fatal to ingestion.
//!
//! Identity: an input with an `origin` (URL, file path) replaces the
//! existing document with the same origin, keeping its id. Inputs without
//! an origin always create a new document.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::index::VectorIndex;
use crate::models::{Chunk, Document, IndexEntry, SourceKind};
use crate::normalize::{collapse_whitespace, normalize_html};
use crate::store::DocumentStore;

const TITLE_MAX_CHARS: usize = 80;

/// One unit of capture input, before normalization.
///
/// `raw` is HTML for clips and plain text for every other kind. A missing
/// or blank `title` is derived from the normalized content.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub kind: SourceKind,
    pub title: Option<String>,
    pub origin: Option<String>,
    pub raw: String,
}

/// What [`ingest`] did.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    /// False when the embedding pass failed and the chunks were left
    /// pending.
    pub embedded: bool,
}

pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn derive_title(normalized: &str) -> String {
    let first_line = normalized.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "Untitled".to_string();
    }
    first_line.chars().take(TITLE_MAX_CHARS).collect()
}

/// Run the full capture pipeline for one input.
///
/// Fails with [`EngineError::EmptyContent`] before anything is persisted
/// when normalization leaves no text.
pub async fn ingest(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
    req: IngestRequest,
) -> EngineResult<IngestOutcome> {
    let normalized = match req.kind {
        SourceKind::Clip => normalize_html(&req.raw)?,
        SourceKind::Note | SourceKind::Transcript => collapse_whitespace(&req.raw),
    };
    if normalized.is_empty() {
        return Err(EngineError::EmptyContent);
    }

    // Origin equality decides between replace and create.
    let now = now_ts();
    let (id, created_at) = match &req.origin {
        Some(origin) => match store.find_document_by_origin(origin).await? {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4().to_string(), now),
        },
        None => (Uuid::new_v4().to_string(), now),
    };

    let title = match req.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.chars().take(TITLE_MAX_CHARS).collect(),
        _ => derive_title(&normalized),
    };

    let doc = Document {
        id: id.clone(),
        source_kind: req.kind,
        title,
        origin: req.origin.clone(),
        created_at,
        updated_at: now,
        raw_content: normalized.clone(),
    };

    let chunks = chunk_text(&id, &normalized, chunking.chunk_chars, chunking.overlap_chars);
    store.put_document(&doc, &chunks).await?;

    debug!(
        document_id = %id,
        kind = %req.kind,
        chunks = chunks.len(),
        "stored document"
    );

    // Best-effort inline embedding. On failure the store already holds the
    // new chunk set with no current embeddings, so the index must drop the
    // document's stale entries rather than keep serving them.
    let embedded = match embed_chunks(store, embedder, &chunks).await {
        Ok(entries) => {
            index.replace_document(&id, entries);
            true
        }
        Err(err) => {
            warn!(document_id = %id, error = %err, "embedding deferred, chunks stay pending");
            index.remove_document(&id);
            false
        }
    };

    Ok(IngestOutcome {
        document_id: id,
        chunk_count: chunks.len(),
        embedded,
    })
}

/// Embed a chunk set and persist each vector. Returns the index entries on
/// success.
async fn embed_chunks(
    store: &dyn DocumentStore,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
) -> anyhow::Result<Vec<IndexEntry>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        anyhow::bail!(
            "Embedding backend returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );
    }

    let model = embedder.model_name();
    let mut entries = Vec::with_capacity(chunks.len());
    for (chunk, vector) in chunks.iter().zip(vectors.into_iter()) {
        store
            .upsert_embedding(&chunk.id, &chunk.document_id, &vector, model, &chunk.content_hash)
            .await?;
        entries.push(IndexEntry {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            sequence_index: chunk.sequence_index,
            vector,
        });
    }
    Ok(entries)
}

/// Embed every chunk that has no current embedding for the configured
/// model, in batches. Returns how many chunks were embedded.
pub async fn embed_pending(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> EngineResult<usize> {
    let batch_size = batch_size.max(1);
    let model = embedder.model_name();
    let mut total = 0usize;

    loop {
        let pending = store.pending_chunks(model, batch_size as i64).await?;
        if pending.is_empty() {
            break;
        }

        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .map_err(EngineError::embedding_unavailable)?;
        if vectors.len() != pending.len() {
            return Err(EngineError::embedding_unavailable(format!(
                "backend returned {} vectors for {} chunks",
                vectors.len(),
                pending.len()
            )));
        }

        for (chunk, vector) in pending.iter().zip(vectors.into_iter()) {
            store
                .upsert_embedding(&chunk.id, &chunk.document_id, &vector, model, &chunk.content_hash)
                .await?;
            index.upsert(IndexEntry {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                sequence_index: chunk.sequence_index,
                vector,
            });
        }

        total += pending.len();
        if pending.len() < batch_size {
            break;
        }
    }

    Ok(total)
}

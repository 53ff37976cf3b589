//! Core data models used throughout memex.
//!
//! These types represent the documents, chunks, and result views that flow
//! through the ingestion, retrieval, and chat pipeline.

use serde::{Deserialize, Serialize};

/// Where an ingested document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Typed or file-based note.
    Note,
    /// Web clipping saved from the browser extension.
    Clip,
    /// Voice memo transcript.
    Transcript,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Note => "note",
            SourceKind::Clip => "clip",
            SourceKind::Transcript => "transcript",
        }
    }

    pub fn parse(s: &str) -> Option<SourceKind> {
        match s {
            "note" => Some(SourceKind::Note),
            "clip" => Some(SourceKind::Clip),
            "transcript" => Some(SourceKind::Transcript),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized document persisted in the store.
///
/// `id` is immutable once assigned. Re-ingesting the same `origin` keeps the
/// id and `created_at` and advances `updated_at`; documents without an origin
/// are always new. Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_kind: SourceKind,
    pub title: String,
    /// URL for clips, absolute path for file-backed notes, None otherwise.
    pub origin: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Normalized text the chunk set was derived from.
    pub raw_content: String,
}

/// A contiguous segment of a document's text, the unit of embedding and
/// retrieval.
///
/// Chunk ids are deterministic (UUID v5 over document id, sequence index,
/// and content hash), so re-ingesting identical content reproduces the
/// identical chunk set. `sequence_index` is contiguous from 0 within a
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub sequence_index: i64,
    pub text: String,
    /// SHA-256 of `text`, used to detect stale embeddings.
    pub content_hash: String,
}

/// A single ranked hit returned from search. A view, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub title: String,
    pub origin: Option<String>,
    /// Cosine similarity of the matched chunk against the query.
    pub score: f32,
    pub content_snippet: String,
}

/// Answer produced by the chat orchestrator.
///
/// `cited_document_ids` lists the documents whose chunks were actually
/// placed in the prompt, in rank order, deduplicated. It is never derived
/// from the generated text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer_text: String,
    pub cited_document_ids: Vec<String>,
}

/// Filter for `list_documents`.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub source_kind: Option<SourceKind>,
    pub limit: Option<i64>,
}

/// Entry held by the in-memory vector index. Derived from the store, never
/// authoritative.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub sequence_index: i64,
    pub vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_through_str() {
        for kind in [SourceKind::Note, SourceKind::Clip, SourceKind::Transcript] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("bogus"), None);
    }

    #[test]
    fn source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::Transcript).unwrap();
        assert_eq!(json, "\"transcript\"");
    }
}

//! Storage abstraction for memex.
//!
//! The [`DocumentStore`] trait defines every persistence operation the
//! engine needs, enabling pluggable backends. The SQLite implementation is
//! the durable default; the in-memory implementation backs unit tests and
//! embedded use.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, DocumentFilter, IndexEntry};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put_document`](DocumentStore::put_document) | Atomically write a document and its full chunk set |
/// | [`find_document_by_origin`](DocumentStore::find_document_by_origin) | Re-ingest detection by origin equality |
/// | [`get_document`](DocumentStore::get_document) | Fetch one document |
/// | [`get_chunks`](DocumentStore::get_chunks) | Fetch a document's chunks in order |
/// | [`get_chunk`](DocumentStore::get_chunk) | Fetch one chunk |
/// | [`delete_document`](DocumentStore::delete_document) | Cascade-delete a document, its chunks, and embeddings |
/// | [`list_documents`](DocumentStore::list_documents) | Filtered listing, newest first |
/// | [`count_documents`](DocumentStore::count_documents) | Corpus size |
/// | [`upsert_embedding`](DocumentStore::upsert_embedding) | Persist one chunk's vector |
/// | [`pending_chunks`](DocumentStore::pending_chunks) | Chunks lacking a current embedding |
/// | [`load_index_entries`](DocumentStore::load_index_entries) | Everything needed to rebuild the vector index |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write the document row and its complete chunk set in one
    /// transaction. A pre-existing chunk set for the document (and its
    /// persisted embeddings) is superseded, never partially patched.
    /// Returns the document id.
    async fn put_document(&self, doc: &Document, chunks: &[Chunk]) -> Result<String>;

    /// Look up a document by exact origin. Documents without an origin are
    /// never returned.
    async fn find_document_by_origin(&self, origin: &str) -> Result<Option<Document>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// A document's chunks ordered by sequence index.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    /// Delete a document together with its chunks and embeddings. Returns
    /// false when the id is unknown.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// List documents, newest update first.
    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>>;

    async fn count_documents(&self) -> Result<i64>;

    /// Persist an embedding for a chunk, replacing any prior vector.
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()>;

    /// Chunks with no embedding for `model`, or whose text changed since
    /// the embedding was computed (content hash mismatch). These are the
    /// "pending" chunks invisible to retrieval.
    async fn pending_chunks(&self, model: &str, limit: i64) -> Result<Vec<Chunk>>;

    /// All current (non-stale) embeddings for `model`, joined with their
    /// chunk coordinates, for rebuilding the in-memory index.
    async fn load_index_entries(&self, model: &str) -> Result<Vec<IndexEntry>>;
}

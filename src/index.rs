//! In-memory vector index over chunk embeddings.
//!
//! The index is derived state: the store is the source of truth and the
//! index is rebuilt from it on startup ([`VectorIndex::rebuild_from`]).
//! Queries are a brute-force cosine scan, which is comfortably fast at
//! personal-corpus scale and keeps ranking exact.
//!
//! All mutations take the write lock, so a query never observes a
//! half-applied upsert, and [`VectorIndex::replace_document`] swaps a
//! document's whole entry set in one critical section so concurrent
//! searches see the fully-old or fully-new chunk set.
//!
//! Ordering is deterministic: score descending, then lower sequence index,
//! then lower document id.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::IndexEntry;

/// A scored hit from [`VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk_id: String,
    pub document_id: String,
    pub sequence_index: i64,
    pub score: f32,
}

#[derive(Default)]
pub struct VectorIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a chunk.
    pub fn upsert(&self, entry: IndexEntry) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(entry.chunk_id.clone(), entry);
    }

    /// Remove one chunk's entry. Unknown ids are a no-op.
    pub fn remove(&self, chunk_id: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(chunk_id);
    }

    /// Remove every entry belonging to a document.
    pub fn remove_document(&self, document_id: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, e| e.document_id != document_id);
    }

    /// Replace a document's entries wholesale in one critical section.
    pub fn replace_document(&self, document_id: &str, new_entries: Vec<IndexEntry>) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, e| e.document_id != document_id);
        for entry in new_entries {
            entries.insert(entry.chunk_id.clone(), entry);
        }
    }

    /// Swap in a freshly built index.
    pub fn rebuild_from(&self, all_entries: Vec<IndexEntry>) {
        let mut fresh = HashMap::with_capacity(all_entries.len());
        for entry in all_entries {
            fresh.insert(entry.chunk_id.clone(), entry);
        }
        let mut entries = self.entries.write().unwrap();
        *entries = fresh;
    }

    /// K-nearest chunks by cosine similarity, deterministically ordered.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<IndexHit> {
        if k == 0 {
            return Vec::new();
        }

        let entries = self.entries.read().unwrap();
        let mut hits: Vec<IndexHit> = entries
            .values()
            .map(|e| IndexHit {
                chunk_id: e.chunk_id.clone(),
                document_id: e.document_id.clone(),
                sequence_index: e.sequence_index,
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.sequence_index.cmp(&b.sequence_index))
                .then(a.document_id.cmp(&b.document_id))
        });
        hits.truncate(k);
        hits
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// True if the index holds an entry for the chunk.
    pub fn contains(&self, chunk_id: &str) -> bool {
        self.entries.read().unwrap().contains_key(chunk_id)
    }
}

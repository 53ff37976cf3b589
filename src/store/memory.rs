//! In-memory [`DocumentStore`] implementation for tests.
//!
//! All collections live behind a single `std::sync::RwLock`, so a
//! multi-table write such as `put_document` is atomic as observed by
//! readers, matching the transactional behavior of the SQLite backend.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, DocumentFilter, IndexEntry};

use super::DocumentStore;

struct StoredEmbedding {
    chunk_id: String,
    document_id: String,
    model: String,
    content_hash: String,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<String, Document>,
    chunks: Vec<Chunk>,
    embeddings: Vec<StoredEmbedding>,
}

impl Inner {
    fn current_embedding_exists(&self, chunk: &Chunk, model: &str) -> bool {
        self.embeddings.iter().any(|e| {
            e.chunk_id == chunk.id && e.model == model && e.content_hash == chunk.content_hash
        })
    }
}

/// In-memory store used by unit and integration tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_document(&self, doc: &Document, chunks: &[Chunk]) -> Result<String> {
        let mut inner = self.inner.write().unwrap();

        let mut stored = doc.clone();
        if let Some(existing) = inner.docs.get(&doc.id) {
            stored.created_at = existing.created_at;
        }
        inner.docs.insert(doc.id.clone(), stored);

        inner.embeddings.retain(|e| e.document_id != doc.id);
        inner.chunks.retain(|c| c.document_id != doc.id);
        inner.chunks.extend(chunks.iter().cloned());

        Ok(doc.id.clone())
    }

    async fn find_document_by_origin(&self, origin: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .docs
            .values()
            .find(|d| d.origin.as_deref() == Some(origin))
            .cloned())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.docs.get(id).cloned())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        let mut chunks: Vec<Chunk> = inner
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.sequence_index);
        Ok(chunks)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.chunks.iter().find(|c| c.id == chunk_id).cloned())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        inner.embeddings.retain(|e| e.document_id != id);
        inner.chunks.retain(|c| c.document_id != id);
        Ok(inner.docs.remove(id).is_some())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let inner = self.inner.read().unwrap();
        let mut docs: Vec<Document> = inner
            .docs
            .values()
            .filter(|d| match filter.source_kind {
                Some(kind) => d.source_kind == kind,
                None => true,
            })
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            docs.truncate(limit as usize);
        }
        Ok(docs)
    }

    async fn count_documents(&self) -> Result<i64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.docs.len() as i64)
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.embeddings.retain(|e| e.chunk_id != chunk_id);
        inner.embeddings.push(StoredEmbedding {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            model: model.to_string(),
            content_hash: content_hash.to_string(),
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn pending_chunks(&self, model: &str, limit: i64) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().unwrap();
        let mut pending: Vec<Chunk> = inner
            .chunks
            .iter()
            .filter(|c| !inner.current_embedding_exists(c, model))
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence_index.cmp(&b.sequence_index))
        });
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn load_index_entries(&self, model: &str) -> Result<Vec<IndexEntry>> {
        let inner = self.inner.read().unwrap();
        let mut entries: Vec<IndexEntry> = inner
            .embeddings
            .iter()
            .filter(|e| e.model == model)
            .filter_map(|e| {
                let chunk = inner
                    .chunks
                    .iter()
                    .find(|c| c.id == e.chunk_id && c.content_hash == e.content_hash)?;
                Some(IndexEntry {
                    chunk_id: e.chunk_id.clone(),
                    document_id: e.document_id.clone(),
                    sequence_index: chunk.sequence_index,
                    vector: e.vector.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence_index.cmp(&b.sequence_index))
        });
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::models::SourceKind;

    fn doc(id: &str, origin: Option<&str>, content: &str) -> Document {
        Document {
            id: id.to_string(),
            source_kind: SourceKind::Note,
            title: format!("title for {}", id),
            origin: origin.map(|s| s.to_string()),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
            raw_content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn put_replaces_chunks_and_preserves_created_at() {
        let store = MemoryStore::new();
        let mut d = doc("d1", Some("https://example.com/a"), "old body text");
        let old_chunks = chunk_text("d1", &d.raw_content, 512, 64);
        store.put_document(&d, &old_chunks).await.unwrap();
        store
            .upsert_embedding(&old_chunks[0].id, "d1", &[1.0], "hash-384", &old_chunks[0].content_hash)
            .await
            .unwrap();

        d.raw_content = "new body text entirely".to_string();
        d.created_at = 1_999_999_999;
        d.updated_at = 1_700_000_500;
        let new_chunks = chunk_text("d1", &d.raw_content, 512, 64);
        store.put_document(&d, &new_chunks).await.unwrap();

        let fetched = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(fetched.created_at, 1_700_000_000);
        assert_eq!(fetched.updated_at, 1_700_000_500);
        assert_eq!(store.get_chunks("d1").await.unwrap(), new_chunks);
        assert!(store.load_index_entries("hash-384").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_and_reports_existence() {
        let store = MemoryStore::new();
        let d = doc("d1", None, "body to delete");
        let chunks = chunk_text("d1", &d.raw_content, 512, 64);
        store.put_document(&d, &chunks).await.unwrap();
        store
            .upsert_embedding(&chunks[0].id, "d1", &[1.0], "hash-384", &chunks[0].content_hash)
            .await
            .unwrap();

        assert!(store.delete_document("d1").await.unwrap());
        assert!(!store.delete_document("d1").await.unwrap());
        assert!(store.get_chunks("d1").await.unwrap().is_empty());
        assert!(store.pending_chunks("hash-384", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_requires_matching_model_and_hash() {
        let store = MemoryStore::new();
        let d = doc("d1", None, "text awaiting an embedding");
        let chunks = chunk_text("d1", &d.raw_content, 512, 64);
        store.put_document(&d, &chunks).await.unwrap();

        assert_eq!(store.pending_chunks("hash-384", 10).await.unwrap().len(), 1);

        store
            .upsert_embedding(&chunks[0].id, "d1", &[1.0], "other-model", &chunks[0].content_hash)
            .await
            .unwrap();
        assert_eq!(store.pending_chunks("hash-384", 10).await.unwrap().len(), 1);

        store
            .upsert_embedding(&chunks[0].id, "d1", &[1.0], "hash-384", &chunks[0].content_hash)
            .await
            .unwrap();
        assert!(store.pending_chunks("hash-384", 10).await.unwrap().is_empty());
        assert_eq!(store.load_index_entries("hash-384").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_orders_newest_first_with_filter() {
        let store = MemoryStore::new();
        let mut a = doc("a", None, "note a");
        a.updated_at = 100;
        let mut b = doc("b", None, "note b");
        b.updated_at = 200;
        let mut c = doc("c", None, "clip c");
        c.source_kind = SourceKind::Clip;
        c.updated_at = 300;
        for d in [&a, &b, &c] {
            store
                .put_document(d, &chunk_text(&d.id, &d.raw_content, 512, 64))
                .await
                .unwrap();
        }

        let all = store.list_documents(&DocumentFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );

        let clips = store
            .list_documents(&DocumentFilter {
                source_kind: Some(SourceKind::Clip),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].id, "c");
    }
}

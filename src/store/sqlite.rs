//! SQLite-backed [`DocumentStore`] implementation.
//!
//! The durable default backend. One file, WAL journal mode, small pool.
//! `put_document` and `delete_document` run as single transactions so a
//! reader always observes a document's fully-old or fully-new chunk set,
//! never a mix.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, Document, DocumentFilter, IndexEntry, SourceKind};

use super::DocumentStore;

/// SQLite implementation of [`DocumentStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = connect(path).await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_kind TEXT NOT NULL,
            title TEXT NOT NULL,
            origin TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            raw_content TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            UNIQUE(document_id, sequence_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            model TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            vector BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Origin equality is the re-ingest key; a partial unique index leaves
    // origin-less documents unconstrained.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_origin ON documents(origin) WHERE origin IS NOT NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_kind ON documents(source_kind)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_document_id ON embeddings(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let kind_str: String = row.get("source_kind");
    let source_kind = SourceKind::parse(&kind_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown source_kind in database: {}", kind_str))?;

    Ok(Document {
        id: row.get("id"),
        source_kind,
        title: row.get("title"),
        origin: row.get("origin"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        raw_content: row.get("raw_content"),
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        sequence_index: row.get("sequence_index"),
        text: row.get("text"),
        content_hash: row.get("content_hash"),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn put_document(&self, doc: &Document, chunks: &[Chunk]) -> Result<String> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_kind, title, origin,
                                   created_at, updated_at, raw_content)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_kind = excluded.source_kind,
                title = excluded.title,
                origin = excluded.origin,
                updated_at = excluded.updated_at,
                raw_content = excluded.raw_content
            "#,
        )
        .bind(&doc.id)
        .bind(doc.source_kind.as_str())
        .bind(&doc.title)
        .bind(&doc.origin)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(&doc.raw_content)
        .execute(&mut *tx)
        .await?;

        // Supersede the prior chunk set wholesale, embeddings included.
        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, sequence_index, text, content_hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.sequence_index)
            .bind(&chunk.text)
            .bind(&chunk.content_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(doc.id.clone())
    }

    async fn find_document_by_origin(&self, origin: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, source_kind, title, origin, created_at, updated_at, raw_content
             FROM documents WHERE origin = ?",
        )
        .bind(origin)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, source_kind, title, origin, created_at, updated_at, raw_content
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, sequence_index, text, content_hash
             FROM chunks WHERE document_id = ? ORDER BY sequence_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT id, document_id, sequence_index, text, content_hash
             FROM chunks WHERE id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_chunk))
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let mut sql = String::from(
            "SELECT id, source_kind, title, origin, created_at, updated_at, raw_content FROM documents",
        );
        if filter.source_kind.is_some() {
            sql.push_str(" WHERE source_kind = ?");
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(kind) = filter.source_kind {
            query = query.bind(kind.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn count_documents(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()> {
        let blob = vec_to_blob(vector);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO embeddings (chunk_id, document_id, model, content_hash, vector, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                model = excluded.model,
                content_hash = excluded.content_hash,
                vector = excluded.vector,
                created_at = excluded.created_at
            "#,
        )
        .bind(chunk_id)
        .bind(document_id)
        .bind(model)
        .bind(content_hash)
        .bind(blob)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn pending_chunks(&self, model: &str, limit: i64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.sequence_index, c.text, c.content_hash
            FROM chunks c
            LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?
            WHERE e.chunk_id IS NULL OR e.content_hash != c.content_hash
            ORDER BY c.document_id ASC, c.sequence_index ASC
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn load_index_entries(&self, model: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT e.chunk_id, e.document_id, c.sequence_index, e.vector
            FROM embeddings e
            JOIN chunks c ON c.id = e.chunk_id
            WHERE e.model = ? AND e.content_hash = c.content_hash
            ORDER BY e.document_id ASC, c.sequence_index ASC
            "#,
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                IndexEntry {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    sequence_index: row.get("sequence_index"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("memex.db")).await.unwrap();
        (dir, store)
    }

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
    async fn put_and_get_round_trip() {
        let (_dir, store) = temp_store().await;
        let d = doc("d1", Some("file:///notes/a.md"), "Some note content here.");
        let chunks = chunk_text(&d.id, &d.raw_content, 512, 64);

        store.put_document(&d, &chunks).await.unwrap();

        let fetched = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "d1");
        assert_eq!(fetched.origin.as_deref(), Some("file:///notes/a.md"));
        assert_eq!(fetched.raw_content, "Some note content here.");

        let fetched_chunks = store.get_chunks("d1").await.unwrap();
        assert_eq!(fetched_chunks, chunks);
        assert_eq!(store.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let (_dir, store) = temp_store().await;
        assert!(store.get_document("nope").await.unwrap().is_none());
        assert!(store.get_chunk("nope").await.unwrap().is_none());
        assert!(store
            .find_document_by_origin("https://nowhere.example")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn put_replaces_prior_chunk_set_wholesale() {
        let (_dir, store) = temp_store().await;
        let mut d = doc("d1", Some("https://example.com/post"), "old content for the note");
        let old_chunks = chunk_text(&d.id, &d.raw_content, 512, 64);
        store.put_document(&d, &old_chunks).await.unwrap();

        // Persist an embedding for the old chunk, then re-ingest.
        store
            .upsert_embedding(&old_chunks[0].id, "d1", &[0.5, 0.5], "hash-384", &old_chunks[0].content_hash)
            .await
            .unwrap();

        d.raw_content = "entirely new content after a re-clip".to_string();
        d.updated_at = 1_700_000_100;
        let new_chunks = chunk_text(&d.id, &d.raw_content, 512, 64);
        store.put_document(&d, &new_chunks).await.unwrap();

        let fetched = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(fetched.created_at, 1_700_000_000);
        assert_eq!(fetched.updated_at, 1_700_000_100);

        let fetched_chunks = store.get_chunks("d1").await.unwrap();
        assert_eq!(fetched_chunks, new_chunks);
        assert!(store.get_chunk(&old_chunks[0].id).await.unwrap().is_none());

        // Superseded embeddings are gone; the new chunk is pending.
        let entries = store.load_index_entries("hash-384").await.unwrap();
        assert!(entries.is_empty());
        let pending = store.pending_chunks("hash-384", 100).await.unwrap();
        assert_eq!(pending.len(), new_chunks.len());
    }

    #[tokio::test]
    async fn find_by_origin_matches_exactly() {
        let (_dir, store) = temp_store().await;
        let d = doc("d1", Some("https://example.com/a"), "content a");
        store
            .put_document(&d, &chunk_text("d1", "content a", 512, 64))
            .await
            .unwrap();

        let found = store
            .find_document_by_origin("https://example.com/a")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, "d1");

        assert!(store
            .find_document_by_origin("https://example.com/b")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn origin_less_documents_coexist() {
        let (_dir, store) = temp_store().await;
        for id in ["d1", "d2", "d3"] {
            let d = doc(id, None, "typed note content");
            store
                .put_document(&d, &chunk_text(id, "typed note content", 512, 64))
                .await
                .unwrap();
        }
        assert_eq!(store.count_documents().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_cascades_chunks_and_embeddings() {
        let (_dir, store) = temp_store().await;
        let d = doc("d1", None, "note that will be deleted soon");
        let chunks = chunk_text("d1", &d.raw_content, 512, 64);
        store.put_document(&d, &chunks).await.unwrap();
        store
            .upsert_embedding(&chunks[0].id, "d1", &[1.0, 0.0], "hash-384", &chunks[0].content_hash)
            .await
            .unwrap();

        assert!(store.delete_document("d1").await.unwrap());

        assert!(store.get_document("d1").await.unwrap().is_none());
        assert!(store.get_chunks("d1").await.unwrap().is_empty());
        assert!(store.load_index_entries("hash-384").await.unwrap().is_empty());
        assert!(store.pending_chunks("hash-384", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_returns_false() {
        let (_dir, store) = temp_store().await;
        assert!(!store.delete_document("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_kind_newest_first() {
        let (_dir, store) = temp_store().await;
        let mut a = doc("a", None, "first note");
        a.updated_at = 100;
        let mut b = doc("b", None, "second note");
        b.updated_at = 200;
        let mut c = doc("c", None, "a clip");
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

        let notes = store
            .list_documents(&DocumentFilter {
                source_kind: Some(SourceKind::Note),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(notes.len(), 2);

        let limited = store
            .list_documents(&DocumentFilter {
                source_kind: None,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "c");
    }

    #[tokio::test]
    async fn pending_tracks_missing_and_stale_embeddings() {
        let (_dir, store) = temp_store().await;
        let d = doc("d1", None, "some text to embed");
        let chunks = chunk_text("d1", &d.raw_content, 512, 64);
        store.put_document(&d, &chunks).await.unwrap();

        // No embedding yet: pending.
        let pending = store.pending_chunks("hash-384", 100).await.unwrap();
        assert_eq!(pending.len(), 1);

        // Current embedding: not pending, visible to the index loader.
        store
            .upsert_embedding(&chunks[0].id, "d1", &[0.1, 0.2], "hash-384", &chunks[0].content_hash)
            .await
            .unwrap();
        assert!(store.pending_chunks("hash-384", 100).await.unwrap().is_empty());
        let entries = store.load_index_entries("hash-384").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunk_id, chunks[0].id);
        assert_eq!(entries[0].vector, vec![0.1, 0.2]);

        // Embedding recorded under a stale hash: pending again, hidden from
        // the index loader.
        store
            .upsert_embedding(&chunks[0].id, "d1", &[0.1, 0.2], "hash-384", "stalehash")
            .await
            .unwrap();
        assert_eq!(store.pending_chunks("hash-384", 100).await.unwrap().len(), 1);
        assert!(store.load_index_entries("hash-384").await.unwrap().is_empty());

        // A different model's embedding does not satisfy this model.
        store
            .upsert_embedding(&chunks[0].id, "d1", &[0.1, 0.2], "other-model", &chunks[0].content_hash)
            .await
            .unwrap();
        assert_eq!(store.pending_chunks("hash-384", 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memex.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            let d = doc("d1", None, "durable content");
            store
                .put_document(&d, &chunk_text("d1", "durable content", 512, 64))
                .await
                .unwrap();
            store.close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        assert!(store.get_document("d1").await.unwrap().is_some());
    }
}

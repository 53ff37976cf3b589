//! The knowledge engine: one object wiring store, index, providers, and
//! the recording state machine behind the command surface the callers
//! (CLI, HTTP server, file watcher) consume.
//!
//! Writes to the same origin are serialized through a per-origin lock so
//! two concurrent re-ingests of one URL or file cannot race identity
//! resolution and produce duplicate documents. Reads and writes for
//! unrelated documents proceed in parallel.
//!
//! The vector index is derived state. [`Engine::open`] rebuilds it from
//! the store before the engine serves its first query, which is how the
//! index survives process restarts.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::chat::chat;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{EngineError, EngineResult};
use crate::generation::{create_generator, Generator};
use crate::index::VectorIndex;
use crate::ingest::{embed_pending, ingest, IngestOutcome, IngestRequest};
use crate::models::{ChatAnswer, Document, DocumentFilter, SearchResult, SourceKind};
use crate::recorder::{AudioCapture, DisabledCapture, Recorder, RecordingState};
use crate::retrieval::search;
use crate::store::{DocumentStore, SqliteStore};
use crate::transcribe::{create_transcriber, Transcriber};

/// What `stop_recording` produced: the transcript text and the document
/// it was ingested as.
#[derive(Debug, Clone)]
pub struct VoiceMemo {
    pub transcript: String,
    pub document_id: String,
}

pub struct Engine {
    config: Config,
    store: Arc<dyn DocumentStore>,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    transcriber: Arc<dyn Transcriber>,
    recorder: Recorder,
    origin_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
    /// Assemble an engine from explicit parts. The index starts empty;
    /// call [`Engine::rebuild_index`] to load persisted embeddings.
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        transcriber: Arc<dyn Transcriber>,
        capture: Arc<dyn AudioCapture>,
    ) -> Self {
        Self {
            config,
            store,
            index: VectorIndex::new(),
            embedder,
            generator,
            transcriber,
            recorder: Recorder::new(capture),
            origin_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Open the configured SQLite store, build the configured providers,
    /// and rebuild the index so the engine is ready to serve.
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_capture(config, Arc::new(DisabledCapture)).await
    }

    /// Like [`Engine::open`], for hosts that bring a real audio device.
    pub async fn open_with_capture(
        config: Config,
        capture: Arc<dyn AudioCapture>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db.path).await?);
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let transcriber = create_transcriber(&config.transcription)?;

        let engine = Self::new(config, store, embedder, generator, transcriber, capture);
        engine.rebuild_index().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Reload every current embedding from the store and swap the index.
    pub async fn rebuild_index(&self) -> EngineResult<usize> {
        let entries = self
            .store
            .load_index_entries(self.embedder.model_name())
            .await?;
        let count = entries.len();
        self.index.rebuild_from(entries);
        info!(entries = count, model = self.embedder.model_name(), "index rebuilt from store");
        Ok(count)
    }

    async fn origin_lock(&self, origin: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.origin_locks.lock().await;
            locks
                .entry(origin.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn ingest_request(&self, req: IngestRequest) -> EngineResult<IngestOutcome> {
        let _guard = match req.origin.as_deref() {
            Some(origin) => Some(self.origin_lock(origin).await),
            None => None,
        };
        ingest(
            self.store.as_ref(),
            &self.index,
            self.embedder.as_ref(),
            &self.config.chunking,
            req,
        )
        .await
    }

    /// Capture a typed or file-backed note.
    pub async fn ingest_note(
        &self,
        title: Option<String>,
        origin: Option<String>,
        text: String,
    ) -> EngineResult<IngestOutcome> {
        self.ingest_request(IngestRequest {
            kind: SourceKind::Note,
            title,
            origin,
            raw: text,
        })
        .await
    }

    /// Capture a web clipping. A blank URL yields an origin-less document.
    pub async fn ingest_clip(
        &self,
        title: Option<String>,
        url: String,
        html: String,
    ) -> EngineResult<IngestOutcome> {
        let url = url.trim().to_string();
        let origin = if url.is_empty() { None } else { Some(url) };
        self.ingest_request(IngestRequest {
            kind: SourceKind::Clip,
            title,
            origin,
            raw: html,
        })
        .await
    }

    pub async fn search_notes(&self, query: &str) -> EngineResult<Vec<SearchResult>> {
        self.search_notes_with(query, None, None).await
    }

    /// Search with per-call overrides for result count and score floor.
    /// `None` falls back to the configured values.
    pub async fn search_notes_with(
        &self,
        query: &str,
        limit: Option<usize>,
        min_score: Option<f32>,
    ) -> EngineResult<Vec<SearchResult>> {
        let mut retrieval = self.config.retrieval.clone();
        if let Some(limit) = limit {
            retrieval.search_limit = limit;
        }
        if let Some(floor) = min_score {
            retrieval.min_score = floor;
        }
        search(
            self.store.as_ref(),
            &self.index,
            self.embedder.as_ref(),
            &retrieval,
            query,
        )
        .await
    }

    pub async fn chat_with_notes(&self, query: &str) -> EngineResult<ChatAnswer> {
        chat(
            self.store.as_ref(),
            &self.index,
            self.embedder.as_ref(),
            self.generator.as_ref(),
            query,
            self.config.chat.top_k,
            self.config.retrieval.min_score,
        )
        .await
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn start_recording(&self) -> EngineResult<()> {
        self.recorder.start()
    }

    /// Stop the active session, transcribe the audio, and ingest the
    /// transcript as a document before handing the text back.
    pub async fn stop_recording(&self) -> EngineResult<VoiceMemo> {
        let audio = self.recorder.stop()?;
        let transcript = self
            .transcriber
            .transcribe(&audio)
            .await
            .map_err(EngineError::transcription_failed)?;

        let title = format!(
            "Voice memo {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M")
        );
        let outcome = self
            .ingest_request(IngestRequest {
                kind: SourceKind::Transcript,
                title: Some(title),
                origin: None,
                raw: transcript.clone(),
            })
            .await?;
        info!(document_id = %outcome.document_id, "voice memo ingested");

        Ok(VoiceMemo {
            transcript,
            document_id: outcome.document_id,
        })
    }

    /// Abandon the active session without transcribing anything.
    pub fn cancel_recording(&self) -> EngineResult<()> {
        self.recorder.cancel()
    }

    pub async fn get_document(&self, id: &str) -> EngineResult<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id))
    }

    pub async fn list_documents(&self, filter: &DocumentFilter) -> EngineResult<Vec<Document>> {
        Ok(self.store.list_documents(filter).await?)
    }

    pub async fn count_documents(&self) -> EngineResult<i64> {
        Ok(self.store.count_documents().await?)
    }

    /// Delete a document and drop its index entries in the same logical
    /// operation, so a later query cannot return its chunks. Holds the
    /// origin lock, serializing against a concurrent re-ingest of the
    /// same origin.
    pub async fn delete_document(&self, id: &str) -> EngineResult<()> {
        let doc = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id))?;
        let _guard = match doc.origin.as_deref() {
            Some(origin) => Some(self.origin_lock(origin).await),
            None => None,
        };

        let deleted = self.store.delete_document(id).await?;
        if !deleted {
            return Err(EngineError::not_found(id));
        }
        self.index.remove_document(id);
        Ok(())
    }

    /// Backfill embeddings for chunks captured while the backend was
    /// unavailable or disabled.
    pub async fn embed_pending(&self) -> EngineResult<usize> {
        embed_pending(
            self.store.as_ref(),
            &self.index,
            self.embedder.as_ref(),
            self.config.embedding.batch_size,
        )
        .await
    }
}

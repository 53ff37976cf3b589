//! End-to-end engine scenarios on a real SQLite store.
//!
//! These tests exercise the full capture → chunk → embed → retrieve
//! pipeline the way the CLI and HTTP server drive it, using the
//! deterministic hash embedding provider so ranking paths run for real.
//! Generation, transcription, and audio capture are scripted mocks.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use memex::chat::NO_RELEVANT_NOTES_REPLY;
use memex::config::Config;
use memex::embedding::{DisabledEmbedder, Embedder, HashEmbedder};
use memex::engine::Engine;
use memex::error::EngineError;
use memex::generation::Generator;
use memex::models::{DocumentFilter, SourceKind};
use memex::recorder::{AudioCapture, DisabledCapture, MemoryCapture, RecordingState};
use memex::store::SqliteStore;
use memex::transcribe::{DisabledTranscriber, Transcriber};

// ─── Fixtures ───────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("memex.db");
    let config_content = format!(
        r#"
[db]
path = "{}"
"#,
        db_path.display()
    );
    toml::from_str(&config_content).unwrap()
}

/// Engine with the default provider set: hash embeddings, generation and
/// transcription disabled, no capture device.
async fn open_engine(tmp: &TempDir) -> Engine {
    Engine::open(test_config(tmp)).await.unwrap()
}

/// Engine assembled from explicit collaborators over a SQLite store in
/// `tmp`. Reopening the same `tmp` reuses the same database file.
async fn engine_with(
    tmp: &TempDir,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    transcriber: Arc<dyn Transcriber>,
    capture: Arc<dyn AudioCapture>,
) -> Engine {
    let cfg = test_config(tmp);
    let store = Arc::new(SqliteStore::open(&cfg.db.path).await.unwrap());
    Engine::new(cfg, store, embedder, generator, transcriber, capture)
}

/// Generator that counts invocations and returns a fixed reply.
struct CountingGenerator {
    calls: AtomicUsize,
    reply: &'static str,
}

impl CountingGenerator {
    fn new(reply: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn model_name(&self) -> &str {
        "counting-mock"
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.to_string())
    }
}

/// Transcriber that returns a fixed transcript for any audio.
struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    fn model_name(&self) -> &str {
        "transcriber-mock"
    }

    async fn transcribe(&self, _audio_wav: &[u8]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

// ─── Capture and search ─────────────────────────────────────────────

/// A saved clip is findable by meaning: the full /save → /search flow.
#[tokio::test]
async fn saved_clip_is_searchable() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    let outcome = engine
        .ingest_clip(
            Some("Rust Ownership".to_string()),
            "https://example.com/ownership".to_string(),
            "<p>Ownership rules govern how memory is managed in Rust programs.</p>".to_string(),
        )
        .await
        .unwrap();
    assert!(outcome.embedded, "hash provider embeds inline");
    assert!(outcome.chunk_count >= 1);

    let results = engine.search_notes("ownership").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Rust Ownership");
    assert_eq!(results[0].document_id, outcome.document_id);
    assert!(
        results[0].score > 0.2,
        "score {} should clear the floor",
        results[0].score
    );
    assert!(results[0].content_snippet.contains("Ownership rules"));
    assert_eq!(
        results[0].origin.as_deref(),
        Some("https://example.com/ownership")
    );
}

#[tokio::test]
async fn search_on_empty_corpus_returns_empty() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    let results = engine.search_notes("anything at all").await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn unrelated_query_returns_empty_not_weak_hits() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    engine
        .ingest_note(
            Some("Rust Ownership".to_string()),
            None,
            "Ownership rules govern how memory is managed.".to_string(),
        )
        .await
        .unwrap();

    let results = engine
        .search_notes("zebra kangaroo telescope")
        .await
        .unwrap();
    assert!(results.is_empty(), "nothing relevant should mean no results");
}

/// Saving the same URL again replaces the document instead of duplicating.
#[tokio::test]
async fn resaving_url_updates_in_place() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    let first = engine
        .ingest_clip(
            Some("Rust Ownership".to_string()),
            "https://example.com/ownership".to_string(),
            "<p>Ownership rules govern how memory is managed in Rust programs.</p>".to_string(),
        )
        .await
        .unwrap();
    let second = engine
        .ingest_clip(
            Some("Rust Ownership, revised".to_string()),
            "https://example.com/ownership".to_string(),
            "<p>Borrowing lets code use values without taking ownership of them.</p>".to_string(),
        )
        .await
        .unwrap();

    assert_eq!(first.document_id, second.document_id);
    assert_eq!(engine.count_documents().await.unwrap(), 1);

    let doc = engine.get_document(&first.document_id).await.unwrap();
    assert_eq!(doc.title, "Rust Ownership, revised");
    assert!(doc.raw_content.contains("Borrowing"));
    assert!(!doc.raw_content.contains("memory is managed"));
}

#[tokio::test]
async fn markup_only_clip_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    let err = engine
        .ingest_clip(
            None,
            "https://example.com/empty".to_string(),
            "<div><script>let x = 1;</script></div>".to_string(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyContent));
    assert_eq!(engine.count_documents().await.unwrap(), 0);
}

#[tokio::test]
async fn list_filters_by_kind() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    engine
        .ingest_note(None, None, "A note about gardening.".to_string())
        .await
        .unwrap();
    engine
        .ingest_clip(
            Some("Clip".to_string()),
            "https://example.com/page".to_string(),
            "<p>A clipped page about carpentry.</p>".to_string(),
        )
        .await
        .unwrap();

    let all = engine
        .list_documents(&DocumentFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let clips = engine
        .list_documents(&DocumentFilter {
            source_kind: Some(SourceKind::Clip),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].title, "Clip");
}

// ─── Delete ─────────────────────────────────────────────────────────

/// Deleting removes the document, its chunks, and its index entries:
/// no later query may return deleted content.
#[tokio::test]
async fn deleted_document_never_comes_back() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp).await;

    let outcome = engine
        .ingest_note(
            Some("Rust Ownership".to_string()),
            None,
            "Ownership rules govern how memory is managed.".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(engine.search_notes("ownership").await.unwrap().len(), 1);

    engine.delete_document(&outcome.document_id).await.unwrap();

    assert!(engine.search_notes("ownership").await.unwrap().is_empty());
    assert!(matches!(
        engine.get_document(&outcome.document_id).await.unwrap_err(),
        EngineError::NotFound(_)
    ));
    assert!(matches!(
        engine
            .delete_document(&outcome.document_id)
            .await
            .unwrap_err(),
        EngineError::NotFound(_)
    ));
    assert_eq!(engine.index_len(), 0);
}

// ─── Restart ────────────────────────────────────────────────────────

/// The vector index is derived state: a fresh process over the same
/// database answers the same searches without re-ingesting anything.
#[tokio::test]
async fn restart_rebuilds_index_from_store() {
    let tmp = TempDir::new().unwrap();

    let document_id = {
        let engine = open_engine(&tmp).await;
        let outcome = engine
            .ingest_note(
                Some("Rust Ownership".to_string()),
                None,
                "Ownership rules govern how memory is managed.".to_string(),
            )
            .await
            .unwrap();
        outcome.document_id
    };

    let reopened = open_engine(&tmp).await;
    assert!(reopened.index_len() > 0, "rebuild should load embeddings");

    let results = reopened.search_notes("ownership").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, document_id);
}

// ─── Chat ───────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_answers_from_notes_and_cites_them() {
    let tmp = TempDir::new().unwrap();
    let generator = Arc::new(CountingGenerator::new(
        "The notes describe ownership rules [1].",
    ));
    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        generator.clone(),
        Arc::new(DisabledTranscriber),
        Arc::new(DisabledCapture),
    )
    .await;

    let outcome = engine
        .ingest_note(
            Some("Rust Ownership".to_string()),
            None,
            "Ownership rules govern how memory is managed.".to_string(),
        )
        .await
        .unwrap();

    let answer = engine
        .chat_with_notes("What does the note say about ownership?")
        .await
        .unwrap();

    assert_eq!(answer.answer_text, "The notes describe ownership rules [1].");
    assert_eq!(answer.cited_document_ids, vec![outcome.document_id]);
    assert_eq!(generator.calls(), 1);
}

/// With nothing relevant saved, chat uses the fixed reply and the
/// generator is never invoked, so it cannot hallucinate grounding.
#[tokio::test]
async fn chat_with_no_notes_skips_the_generator() {
    let tmp = TempDir::new().unwrap();
    let generator = Arc::new(CountingGenerator::new("should never be seen"));
    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        generator.clone(),
        Arc::new(DisabledTranscriber),
        Arc::new(DisabledCapture),
    )
    .await;

    let answer = engine.chat_with_notes("anything").await.unwrap();

    assert_eq!(answer.answer_text, NO_RELEVANT_NOTES_REPLY);
    assert!(answer.cited_document_ids.is_empty());
    assert_eq!(generator.calls(), 0);
}

// ─── Voice memos ────────────────────────────────────────────────────

#[tokio::test]
async fn voice_memo_is_transcribed_and_searchable() {
    let tmp = TempDir::new().unwrap();
    let capture = Arc::new(MemoryCapture::new());
    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        Arc::new(CountingGenerator::new("unused")),
        Arc::new(FixedTranscriber("Remember to buy milk tomorrow morning.")),
        capture.clone(),
    )
    .await;

    capture.set_audio(vec![1, 2, 3, 4]);
    engine.start_recording().unwrap();
    assert_eq!(engine.recording_state(), RecordingState::Recording);

    let memo = engine.stop_recording().await.unwrap();
    assert_eq!(memo.transcript, "Remember to buy milk tomorrow morning.");
    assert_eq!(engine.recording_state(), RecordingState::Idle);

    let doc = engine.get_document(&memo.document_id).await.unwrap();
    assert_eq!(doc.source_kind, SourceKind::Transcript);
    assert!(doc.title.starts_with("Voice memo"));
    assert_eq!(doc.raw_content, "Remember to buy milk tomorrow morning.");

    let results = engine.search_notes("milk").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, memo.document_id);
}

#[tokio::test]
async fn double_start_is_rejected_and_session_survives() {
    let tmp = TempDir::new().unwrap();
    let capture = Arc::new(MemoryCapture::new());
    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        Arc::new(CountingGenerator::new("unused")),
        Arc::new(FixedTranscriber("still here")),
        capture.clone(),
    )
    .await;

    engine.start_recording().unwrap();
    let err = engine.start_recording().unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRecording));

    // The original session is unaffected and can still be stopped.
    assert_eq!(engine.recording_state(), RecordingState::Recording);
    let memo = engine.stop_recording().await.unwrap();
    assert_eq!(memo.transcript, "still here");
}

#[tokio::test]
async fn stop_without_start_leaves_no_trace() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        Arc::new(CountingGenerator::new("unused")),
        Arc::new(FixedTranscriber("never produced")),
        Arc::new(MemoryCapture::new()),
    )
    .await;

    let err = engine.stop_recording().await.unwrap_err();
    assert!(matches!(err, EngineError::NotRecording));
    assert_eq!(engine.count_documents().await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_discards_the_session() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        Arc::new(CountingGenerator::new("unused")),
        Arc::new(FixedTranscriber("never produced")),
        Arc::new(MemoryCapture::new()),
    )
    .await;

    engine.start_recording().unwrap();
    engine.cancel_recording().unwrap();
    assert_eq!(engine.recording_state(), RecordingState::Idle);

    let err = engine.stop_recording().await.unwrap_err();
    assert!(matches!(err, EngineError::NotRecording));
    assert_eq!(engine.count_documents().await.unwrap(), 0);
}

// ─── Embedding backfill ─────────────────────────────────────────────

/// Content captured while the embedding provider is down persists as
/// pending and becomes searchable after a backfill with a working one.
#[tokio::test]
async fn pending_chunks_become_searchable_after_backfill() {
    let tmp = TempDir::new().unwrap();

    let outcome = {
        let engine = engine_with(
            &tmp,
            Arc::new(DisabledEmbedder),
            Arc::new(CountingGenerator::new("unused")),
            Arc::new(DisabledTranscriber),
            Arc::new(DisabledCapture),
        )
        .await;
        let outcome = engine
            .ingest_note(
                Some("Rust Ownership".to_string()),
                None,
                "Ownership rules govern how memory is managed.".to_string(),
            )
            .await
            .unwrap();
        assert!(!outcome.embedded, "disabled provider cannot embed");
        assert_eq!(engine.index_len(), 0);
        outcome
    };

    let engine = engine_with(
        &tmp,
        Arc::new(HashEmbedder),
        Arc::new(CountingGenerator::new("unused")),
        Arc::new(DisabledTranscriber),
        Arc::new(DisabledCapture),
    )
    .await;

    let embedded = engine.embed_pending().await.unwrap();
    assert_eq!(embedded, outcome.chunk_count);
    assert_eq!(engine.embed_pending().await.unwrap(), 0);

    let results = engine.search_notes("ownership").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, outcome.document_id);
}

/// A search while the embedding backend is down is an explicit error,
/// never a silently empty result.
#[tokio::test]
async fn search_with_backend_down_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(
        &tmp,
        Arc::new(DisabledEmbedder),
        Arc::new(CountingGenerator::new("unused")),
        Arc::new(DisabledTranscriber),
        Arc::new(DisabledCapture),
    )
    .await;

    let err = engine.search_notes("ownership").await.unwrap_err();
    assert!(matches!(err, EngineError::EmbeddingBackendUnavailable(_)));
}

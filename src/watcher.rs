//! Notes-directory watcher.
//!
//! Watches a directory tree for Markdown files and ingests them as notes
//! with `origin` set to the absolute path, so repeated saves of one file
//! supersede the same document instead of accumulating duplicates.
//!
//! Notify events arrive on a dedicated thread; they are bridged over a
//! channel into an async task that debounces per path (editors fire
//! several events per save) and then runs the ingestion pipeline. Watcher
//! failures are logged and skipped, never fatal to the host process.
//! Deleting a file does not delete its document; removal stays an explicit
//! user action.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::EngineError;

const FLUSH_TICK: Duration = Duration::from_millis(200);

/// Running watcher. Dropping it stops the file monitoring.
pub struct NotesWatcher {
    _watcher: notify::RecommendedWatcher,
}

/// Watch `notes_dir` recursively and ingest changed `.md` files after a
/// quiet period of `debounce`.
pub fn spawn(engine: Arc<Engine>, notes_dir: &Path, debounce: Duration) -> Result<NotesWatcher> {
    let (tx, rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher
        .watch(notes_dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", notes_dir.display()))?;

    info!(dir = %notes_dir.display(), "watching notes directory");
    tokio::spawn(process_events(engine, rx, debounce));

    Ok(NotesWatcher { _watcher: watcher })
}

fn is_note_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("md")
}

async fn process_events(
    engine: Arc<Engine>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    debounce: Duration,
) {
    // Paths touched recently, with the time of their last event.
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut tick = tokio::time::interval(FLUSH_TICK);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(Ok(event)) => {
                        if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                            let now = Instant::now();
                            for path in event.paths {
                                if is_note_file(&path) {
                                    pending.insert(path, now);
                                }
                            }
                        }
                    }
                    Some(Err(err)) => warn!(error = %err, "file watch error"),
                    None => break,
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    ingest_file(&engine, &path).await;
                }
            }
        }
    }
    debug!("notes watcher stopped");
}

async fn ingest_file(engine: &Engine, path: &Path) {
    // The file may be gone again by flush time.
    let Ok(absolute) = path.canonicalize() else {
        debug!(path = %path.display(), "skipping vanished file");
        return;
    };
    let content = match tokio::fs::read_to_string(&absolute).await {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %absolute.display(), error = %err, "failed to read note file");
            return;
        }
    };

    let title = absolute
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    let origin = absolute.to_string_lossy().into_owned();

    match engine.ingest_note(title, Some(origin), content).await {
        Ok(outcome) => {
            info!(
                path = %absolute.display(),
                document_id = %outcome.document_id,
                chunks = outcome.chunk_count,
                "ingested note file"
            );
        }
        Err(EngineError::EmptyContent) => {
            debug!(path = %absolute.display(), "skipping empty note file");
        }
        Err(err) => {
            warn!(path = %absolute.display(), error = %err, "failed to ingest note file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::embedding::create_embedder;
    use crate::generation::create_generator;
    use crate::recorder::DisabledCapture;
    use crate::store::MemoryStore;
    use crate::transcribe::create_transcriber;

    fn test_config(dir: &Path) -> Config {
        Config {
            db: DbConfig {
                path: dir.join("memex.db"),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            chat: Default::default(),
            embedding: Default::default(),
            generation: Default::default(),
            transcription: Default::default(),
            server: Default::default(),
            watcher: Default::default(),
        }
    }

    fn test_engine(dir: &Path) -> Arc<Engine> {
        let config = test_config(dir);
        let embedder = create_embedder(&config.embedding).unwrap();
        let generator = create_generator(&config.generation).unwrap();
        let transcriber = create_transcriber(&config.transcription).unwrap();
        Arc::new(Engine::new(
            config,
            Arc::new(MemoryStore::new()),
            embedder,
            generator,
            transcriber,
            Arc::new(DisabledCapture),
        ))
    }

    async fn wait_for<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[test]
    fn only_markdown_files_are_watched() {
        assert!(is_note_file(Path::new("/notes/todo.md")));
        assert!(!is_note_file(Path::new("/notes/todo.md.swp")));
        assert!(!is_note_file(Path::new("/notes/image.png")));
        assert!(!is_note_file(Path::new("/notes/nodot")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_saves_are_ingested_and_supersede() {
        let dir = tempfile::tempdir().unwrap();
        let notes_dir = dir.path().join("notes");
        std::fs::create_dir_all(&notes_dir).unwrap();

        let engine = test_engine(dir.path());
        let _watcher = spawn(engine.clone(), &notes_dir, Duration::from_millis(200)).unwrap();

        let note_path = notes_dir.join("todo.md");
        tokio::fs::write(&note_path, "first version of the note")
            .await
            .unwrap();

        let engine_ref = engine.clone();
        assert!(
            wait_for(|| {
                let engine = engine_ref.clone();
                async move { engine.count_documents().await.unwrap() == 1 }
            })
            .await,
            "note file was not ingested"
        );

        let docs = engine
            .list_documents(&crate::models::DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(docs[0].title, "todo");
        assert!(docs[0].origin.as_deref().unwrap().ends_with("todo.md"));

        // Saving again replaces the same document.
        tokio::fs::write(&note_path, "second version with different words")
            .await
            .unwrap();

        let engine_ref = engine.clone();
        assert!(
            wait_for(|| {
                let engine = engine_ref.clone();
                async move {
                    let docs = engine
                        .list_documents(&crate::models::DocumentFilter::default())
                        .await
                        .unwrap();
                    docs.len() == 1 && docs[0].raw_content.contains("second version")
                }
            })
            .await,
            "re-save did not supersede the document"
        );

        // Non-markdown noise in the directory is ignored.
        tokio::fs::write(notes_dir.join("scratch.tmp"), "ignored")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(engine.count_documents().await.unwrap(), 1);
    }
}

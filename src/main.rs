//! # Memex CLI (`mx`)
//!
//! The `mx` binary is the primary interface for memex. It provides commands
//! for database initialization, note capture, listing and retrieval,
//! semantic search, grounded chat, embedding maintenance, and starting the
//! local HTTP server used by the browser extension.
//!
//! ## Usage
//!
//! ```bash
//! mx --config ~/.memex/memex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mx init` | Write a starter config and create the SQLite database |
//! | `mx add <file>` / `mx add --text "..."` | Ingest a note |
//! | `mx ls` | List captured documents |
//! | `mx get <id>` | Print a document's metadata and full text |
//! | `mx rm <id>` | Delete a document and its chunks |
//! | `mx search "<query>"` | Semantic search over all notes |
//! | `mx chat "<query>"` | Ask a question grounded in your notes |
//! | `mx embed pending` | Backfill missing or stale embeddings |
//! | `mx embed rebuild` | Reload the vector index from the store |
//! | `mx serve` | Start the local HTTP API (`--watch` adds the notes folder watcher) |
//!
//! ## Examples
//!
//! ```bash
//! # First run: starter config + empty database
//! mx init
//!
//! # Capture a thought
//! mx add --text "Ownership rules govern how memory is managed."
//!
//! # Ingest a Markdown file; re-running after edits updates the same document
//! mx add ~/notes/borrowing.md
//!
//! # Find it again
//! mx search "ownership"
//!
//! # Ask across everything captured
//! mx chat "what do my notes say about ownership?"
//!
//! # Serve the browser extension and watch the notes folder
//! mx serve --watch
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use memex::config::{self, Config};
use memex::engine::Engine;
use memex::models::{DocumentFilter, SourceKind};
use memex::server;
use memex::store::SqliteStore;
use memex::watcher::{self, NotesWatcher};

/// Starter configuration written by `mx init`.
const EXAMPLE_CONFIG: &str = include_str!("../config/memex.example.toml");

/// Memex — a local-first second brain for notes, clippings, and voice memos.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/memex.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mx",
    about = "Memex — a local-first second brain for notes, clippings, and voice memos",
    version,
    long_about = "Memex captures typed notes, web clippings, and voice memo transcripts into \
    a single local SQLite file, embeds them, and answers semantic search and retrieval-grounded \
    chat over everything you have saved. No data leaves the machine unless a remote embedding, \
    generation, or transcription provider is configured."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.memex/memex.toml`. Database, provider, server, and
    /// watcher settings are read from this file.
    #[arg(long, global = true, default_value_os_t = config::default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the configuration and database.
    ///
    /// Writes a commented starter config to the config path (if none exists)
    /// and creates the SQLite database file with its schema. This command is
    /// idempotent — running it multiple times is safe.
    Init,

    /// Ingest a note from a file or from the command line.
    ///
    /// File-based notes use the file's absolute path as their identity, so
    /// re-adding an edited file updates the existing document instead of
    /// creating a duplicate. `--text` notes are always new documents.
    Add {
        /// Path to a text or Markdown file to ingest.
        file: Option<PathBuf>,

        /// Ingest this literal text instead of a file.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Title override. Defaults to the file stem, or the first line of
        /// the text.
        #[arg(long)]
        title: Option<String>,
    },

    /// List captured documents, most recently updated first.
    Ls {
        /// Filter by source kind: `note`, `clip`, or `transcript`.
        #[arg(long)]
        kind: Option<String>,

        /// Maximum number of documents to show.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print a document's metadata and full text.
    Get {
        /// Document id.
        id: String,
    },

    /// Delete a document, its chunks, and its index entries.
    Rm {
        /// Document id.
        id: String,
    },

    /// Search captured documents by meaning.
    ///
    /// Embeds the query and ranks chunks by cosine similarity. Results
    /// below the configured score floor are dropped; an empty result list
    /// means nothing relevant was found.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask a question answered from your notes.
    ///
    /// Retrieves the most relevant chunks, sends them to the configured
    /// generation provider as numbered sources, and prints the answer with
    /// the documents it drew on. With no relevant notes the command prints
    /// a fixed reply and never calls the provider.
    Chat {
        /// The question to ask.
        query: String,
    },

    /// Manage chunk embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Start the local HTTP server.
    ///
    /// Binds the address from `[server]` and serves the capture, search,
    /// chat, and voice recording endpoints used by the browser extension.
    Serve {
        /// Also watch the configured notes folder and auto-ingest changes.
        #[arg(long)]
        watch: bool,
    },
}

/// Embedding maintenance subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    ///
    /// Finds chunks with no embedding for the current model and content
    /// hash, embeds them in batches, and adds them to the live index. Run
    /// this after switching embedding models or after ingesting while the
    /// provider was disabled.
    Pending,

    /// Reload the in-memory vector index from persisted embeddings.
    ///
    /// The index is rebuilt from the store on every startup; this command
    /// forces the same rebuild on demand and prints the entry count.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("memex=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Init runs before config loading so it can seed the config file.
    if matches!(cli.command, Commands::Init) {
        run_init(&cli.config).await?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Add { file, text, title } => {
            let engine = Engine::open(cfg).await?;
            run_add(&engine, file, text, title).await?;
        }
        Commands::Ls { kind, limit } => {
            let engine = Engine::open(cfg).await?;
            run_ls(&engine, kind, limit).await?;
        }
        Commands::Get { id } => {
            let engine = Engine::open(cfg).await?;
            run_get(&engine, &id).await?;
        }
        Commands::Rm { id } => {
            let engine = Engine::open(cfg).await?;
            engine.delete_document(&id).await?;
            println!("Deleted {}", id);
        }
        Commands::Search { query, limit } => {
            let engine = Engine::open(cfg).await?;
            run_search(&engine, &query, limit).await?;
        }
        Commands::Chat { query } => {
            let engine = Engine::open(cfg).await?;
            run_chat(&engine, &query).await?;
        }
        Commands::Embed { action } => {
            let engine = Engine::open(cfg).await?;
            match action {
                EmbedAction::Pending => {
                    let count = engine.embed_pending().await?;
                    println!("Embedded {} pending chunk(s).", count);
                }
                EmbedAction::Rebuild => {
                    let count = engine.rebuild_index().await?;
                    println!("Index rebuilt: {} entries.", count);
                }
            }
        }
        Commands::Serve { watch } => {
            run_serve(cfg, watch).await?;
        }
    }

    Ok(())
}

async fn run_init(config_path: &PathBuf) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, EXAMPLE_CONFIG)?;
        println!("Wrote starter config to {}", config_path.display());
    }

    let cfg = config::load_config(config_path)?;
    SqliteStore::open(&cfg.db.path).await?;
    println!("Database initialized at {}", cfg.db.path.display());
    Ok(())
}

async fn run_add(
    engine: &Engine,
    file: Option<PathBuf>,
    text: Option<String>,
    title: Option<String>,
) -> anyhow::Result<()> {
    let outcome = match (file, text) {
        (Some(path), None) => {
            let content = std::fs::read_to_string(&path)?;
            let absolute = std::fs::canonicalize(&path)?;
            let title = title.or_else(|| {
                absolute
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
            });
            let origin = Some(absolute.to_string_lossy().to_string());
            engine.ingest_note(title, origin, content).await?
        }
        (None, Some(text)) => engine.ingest_note(title, None, text).await?,
        _ => anyhow::bail!("provide a file path or --text"),
    };

    let embed_note = if outcome.embedded {
        "embedded"
    } else {
        "embedding pending"
    };
    println!(
        "Added {} ({} chunk(s), {})",
        outcome.document_id, outcome.chunk_count, embed_note
    );
    Ok(())
}

async fn run_ls(engine: &Engine, kind: Option<String>, limit: Option<i64>) -> anyhow::Result<()> {
    let source_kind = match kind.as_deref() {
        Some(value) => Some(
            SourceKind::parse(value)
                .ok_or_else(|| anyhow::anyhow!("unknown kind '{}': use note, clip, or transcript", value))?,
        ),
        None => None,
    };

    let docs = engine
        .list_documents(&DocumentFilter { source_kind, limit })
        .await?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &docs {
        let date = chrono::DateTime::from_timestamp(doc.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{}  {:<10}  {}  {}",
            doc.id, doc.source_kind, date, doc.title
        );
    }
    println!();
    println!("{} document(s).", docs.len());
    Ok(())
}

async fn run_get(engine: &Engine, id: &str) -> anyhow::Result<()> {
    let doc = engine.get_document(id).await?;

    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!("kind:       {}", doc.source_kind);
    println!("title:      {}", doc.title);
    if let Some(ref origin) = doc.origin {
        println!("origin:     {}", origin);
    }
    println!("created_at: {}", doc.created_at);
    println!("updated_at: {}", doc.updated_at);
    println!();
    println!("--- Content ---");
    println!("{}", doc.raw_content);
    Ok(())
}

async fn run_search(engine: &Engine, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let results = engine.search_notes_with(query, limit, None).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.title);
        if let Some(ref origin) = result.origin {
            println!("    origin: {}", origin);
        }
        println!(
            "    excerpt: \"{}\"",
            result.content_snippet.replace('\n', " ")
        );
        println!("    id: {}", result.document_id);
        println!();
    }
    Ok(())
}

async fn run_chat(engine: &Engine, query: &str) -> anyhow::Result<()> {
    let answer = engine.chat_with_notes(query).await?;

    println!("{}", answer.answer_text);

    if !answer.cited_document_ids.is_empty() {
        println!();
        println!("Sources:");
        for id in &answer.cited_document_ids {
            match engine.get_document(id).await {
                Ok(doc) => println!("  - {} ({})", doc.title, id),
                Err(_) => println!("  - {}", id),
            }
        }
    }
    Ok(())
}

async fn run_serve(cfg: Config, watch: bool) -> anyhow::Result<()> {
    let watch_dir = if watch || cfg.watcher.enabled {
        match cfg.watcher.notes_dir.clone() {
            Some(dir) => Some(dir),
            None => anyhow::bail!("watcher.notes_dir must be set to use --watch"),
        }
    } else {
        None
    };
    let debounce = std::time::Duration::from_secs(cfg.watcher.debounce_secs);

    let engine = Arc::new(Engine::open(cfg).await?);

    // Catch up on anything ingested while the embedding provider was down.
    if engine.config().embedding.is_enabled() {
        match engine.embed_pending().await {
            Ok(0) => {}
            Ok(count) => println!("Embedded {} pending chunk(s).", count),
            Err(err) => tracing::warn!(error = %err, "startup embedding backfill failed"),
        }
    }

    let _watcher: Option<NotesWatcher> = match watch_dir {
        Some(dir) => {
            let notes_watcher = watcher::spawn(engine.clone(), &dir, debounce)?;
            println!("Watching {} for note changes", dir.display());
            Some(notes_watcher)
        }
        None => None,
    };

    server::run_server(engine).await
}

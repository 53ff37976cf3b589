//! # Memex
//!
//! A local-first second-brain engine: capture typed notes, web clippings,
//! and voice memos, then search and chat over them with semantic retrieval.
//!
//! Everything lives on the local machine. Documents and chunk embeddings
//! persist in a single SQLite file; an in-memory vector index answers
//! similarity queries and is rebuilt from the store on startup. Network
//! calls happen only when a remote embedding, generation, or transcription
//! provider is configured.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐   ┌─────────────┐   ┌───────────┐
//! │ Capture                  │──▶│  Ingestion   │──▶│  SQLite    │
//! │ notes / clips / voice    │   │ Chunk+Embed │   │ docs+vecs │
//! └──────────────────────────┘   └─────────────┘   └────┬──────┘
//!                                                       │ rebuild
//!                                                       ▼
//!                                                ┌─────────────┐
//!                                                │ VectorIndex │
//!                                                └──────┬──────┘
//!                          ┌────────────────────────────┤
//!                          ▼                            ▼
//!                    ┌──────────┐                 ┌──────────┐
//!                    │   CLI    │                 │   HTTP   │
//!                    │   (mx)   │                 │  /save…  │
//!                    └──────────┘                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mx init                          # create the database
//! mx add --text "Ownership rules govern how memory is managed."
//! mx search "ownership"            # semantic search
//! mx chat "what do my notes say about ownership?"
//! mx serve --watch                 # HTTP API + notes folder watcher
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`engine`] | Facade wiring store, index, and providers |
//! | [`ingest`] | Normalize, chunk, persist, embed |
//! | [`index`] | In-memory cosine-similarity vector index |
//! | [`retrieval`] | Semantic search with score floor and snippets |
//! | [`chat`] | Retrieval-grounded question answering |
//! | [`recorder`] | Voice memo session state machine |
//! | [`watcher`] | Notes folder auto-ingestion |
//! | [`server`] | Local HTTP API |
//! | [`store`] | Document store trait, SQLite and in-memory backends |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod recorder;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod transcribe;
pub mod watcher;

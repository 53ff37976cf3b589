//! Retrieval-augmented chat over the corpus.
//!
//! The orchestrator retrieves the top chunks for the question, refuses to
//! call the generator when nothing relevant was found (returning a fixed
//! reply instead), and otherwise builds a prompt whose numbered source
//! blocks are the only material the generator sees. The citation list is
//! derived from the chunks placed in that prompt, never parsed back out of
//! the generated text, so an answer can cite only documents that actually
//! grounded it.

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::generation::Generator;
use crate::index::VectorIndex;
use crate::models::ChatAnswer;
use crate::retrieval::{retrieve, RetrievedChunk};
use crate::store::DocumentStore;

/// Returned verbatim when retrieval finds nothing above the threshold.
pub const NO_RELEVANT_NOTES_REPLY: &str =
    "I couldn't find any relevant notes to answer your question.";

const SYSTEM_PROMPT: &str = "You are a personal notes assistant. Answer the question using only \
the numbered sources provided. If the sources do not contain the answer, say that the notes do \
not cover it. Refer to sources by their bracketed number.";

/// Answer a question grounded in retrieved chunks.
pub async fn chat(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    query: &str,
    top_k: usize,
    min_score: f32,
) -> EngineResult<ChatAnswer> {
    let retrieved = retrieve(store, index, embedder, query, top_k, min_score).await?;

    if retrieved.is_empty() {
        // Nothing to ground on. Never invoke the generator here.
        return Ok(ChatAnswer {
            answer_text: NO_RELEVANT_NOTES_REPLY.to_string(),
            cited_document_ids: Vec::new(),
        });
    }

    let prompt = build_prompt(query, &retrieved);
    let cited_document_ids = cited_ids(&retrieved);
    debug!(
        sources = retrieved.len(),
        documents = cited_document_ids.len(),
        "generating grounded answer"
    );

    let answer_text = generator
        .complete(SYSTEM_PROMPT, &prompt)
        .await
        .map_err(EngineError::generation_unavailable)?;

    Ok(ChatAnswer {
        answer_text,
        cited_document_ids,
    })
}

fn build_prompt(query: &str, retrieved: &[RetrievedChunk]) -> String {
    let mut prompt = String::new();
    for (i, r) in retrieved.iter().enumerate() {
        prompt.push_str(&format!(
            "Source [{}]: {}\n{}\n\n",
            i + 1,
            r.document.title,
            r.chunk.text
        ));
    }
    prompt.push_str(&format!("Question: {}", query));
    prompt
}

/// Document ids of the prompt's sources, deduplicated in rank order.
fn cited_ids(retrieved: &[RetrievedChunk]) -> Vec<String> {
    let mut ids = Vec::new();
    for r in retrieved {
        if !ids.iter().any(|id| id == &r.document.id) {
            ids.push(r.document.id.clone());
        }
    }
    ids
}

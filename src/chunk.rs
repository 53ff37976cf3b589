//! Fixed-window text chunker with overlap.
//!
//! Splits normalized document text into [`Chunk`]s of at most `chunk_chars`
//! characters, overlapping consecutive windows by `overlap_chars` so that
//! content near a boundary is retrievable from either side. Cuts prefer a
//! whitespace boundary in the back half of the window and never land inside
//! a multi-byte character.
//!
//! Chunking is a pure function of the text and the window parameters: chunk
//! ids are UUIDv5 values derived from the owning document id, the sequence
//! index, and a SHA-256 hash of the chunk text, so re-ingesting identical
//! content reproduces the identical chunk set.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into overlapping windows. Returns chunks with contiguous
/// sequence indices starting at 0; empty or whitespace-only input yields no
/// chunks (callers reject that input before chunking).
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    if text.trim().is_empty() || chunk_chars == 0 {
        return Vec::new();
    }

    // Window math runs in char space so multi-byte text can never be split
    // mid-character.
    let cs: Vec<char> = text.chars().collect();
    let n = cs.len();
    let overlap = overlap_chars.min(chunk_chars.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let hard_end = (start + chunk_chars).min(n);
        let mut end = hard_end;

        // Prefer cutting just after a whitespace char in the back half of
        // the window, so words stay whole where the text allows it.
        if end < n {
            let floor = start + chunk_chars / 2;
            if let Some(pos) = (floor..end).rev().find(|&i| cs[i].is_whitespace()) {
                end = pos + 1;
            }
        }

        let piece: String = cs[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(make_chunk(document_id, index, trimmed));
            index += 1;
        }

        if end >= n {
            break;
        }
        // Overlap the next window; always make forward progress even with
        // degenerate parameters.
        start = (end.saturating_sub(overlap)).max(start + 1);
    }

    chunks
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    let name = format!("{}/{}/{}", document_id, index, content_hash);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();

    Chunk {
        id,
        document_id: document_id.to_string(),
        sequence_index: index,
        text: text.to_string(),
        content_hash,
    }
}

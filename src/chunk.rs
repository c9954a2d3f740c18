//! Sliding-window text chunker.
//!
//! Splits document body text into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks of the same document share exactly
//! `chunk_overlap` characters, so a sentence cut at a boundary still appears
//! whole in one of the two neighbours.
//!
//! Sizes are counted in Unicode scalar values, not bytes, so accented
//! Portuguese text never splits inside a character.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Split a document into overlapping chunks.
///
/// Returns no chunks for an empty body. Requires `chunk_overlap < chunk_size`
/// (checked by config validation); a violating pair degrades to a step of one
/// character rather than looping forever.
pub fn chunk_document(doc: &Document, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    chunk_text(&doc.id, &doc.source, &doc.body, chunk_size, chunk_overlap)
}

/// Split raw text into overlapping chunks with contiguous indices from 0.
pub fn chunk_text(
    document_id: &str,
    source: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    // Byte offset of every char, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_len = bounds.len();
    bounds.push(text.len());

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        let piece = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(document_id, source, chunk_index, start, piece));
        chunk_index += 1;

        if end == char_len {
            break;
        }
        start += step;
    }

    chunks
}

/// Number of chunks [`chunk_text`] produces for a text of `char_len` characters.
pub fn expected_chunk_count(char_len: usize, chunk_size: usize, chunk_overlap: usize) -> usize {
    let chunk_size = chunk_size.max(1);
    if char_len == 0 {
        return 0;
    }
    if char_len <= chunk_size {
        return 1;
    }
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    1 + (char_len - chunk_size).div_ceil(step)
}

fn make_chunk(document_id: &str, source: &str, index: i64, char_offset: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        source: source.to_string(),
        chunk_index: index,
        char_offset,
        text: text.to_string(),
        hash,
    }
}

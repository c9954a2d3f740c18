//! Core data models used throughout E-Cris.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the index build and the question-answering pipeline.

use serde::Serialize;

/// A reference document loaded from disk, before chunking.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// File path exactly as configured.
    pub source: String,
    pub title: String,
    pub content_type: String,
    pub body: String,
}

/// A contiguous slice of a document's body text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source: String,
    pub chunk_index: i64,
    /// Offset of the first character of `text` within the document body,
    /// counted in characters.
    pub char_offset: usize,
    pub text: String,
    pub hash: String,
}

/// A chunk paired with its embedding, ready for the vector index.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks relevant to one query, most similar first.
///
/// Holds at most `top_k` entries and every score is at or above the
/// similarity threshold it was built with. Empty is a valid result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    items: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Order candidates by descending score, keep the best `top_k`, then
    /// drop those below `threshold`. NaN scores never qualify.
    pub fn from_candidates(mut candidates: Vec<ScoredChunk>, top_k: usize, threshold: f32) -> Self {
        candidates.retain(|c| !c.score.is_nan());
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(top_k);
        candidates.retain(|c| c.score >= threshold);
        Self { items: candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<ScoredChunk> {
        self.items
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

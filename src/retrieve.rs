//! Similarity retrieval over the vector index.
//!
//! [`retrieve`] is the pure operation: nearest top-K by cosine similarity,
//! then drop everything under the threshold. [`Retriever`] pairs it with an
//! [`Embedder`] so callers can retrieve by question text.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::RetrievalResult;

/// Retrieve at most `top_k` chunks scoring at least `threshold`.
///
/// Fewer results than `top_k`, including none, is a normal outcome. A query
/// vector of the wrong dimensionality is an error.
pub async fn retrieve(
    index: &dyn VectorIndex,
    query: &[f32],
    top_k: usize,
    threshold: f32,
) -> Result<RetrievalResult> {
    if query.len() != index.dims() {
        bail!(
            "Query vector has {} dimensions but the index stores {}",
            query.len(),
            index.dims()
        );
    }

    let candidates = index.nearest(query, top_k).await?;
    let result = RetrievalResult::from_candidates(candidates, top_k, threshold);
    debug!(top_k, threshold, hits = result.len(), "retrieval done");
    Ok(result)
}

/// Embeds questions and retrieves against one index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    pub top_k: usize,
    pub threshold: f32,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            threshold,
        }
    }

    pub async fn retrieve_text(&self, question: &str) -> Result<RetrievalResult> {
        self.retrieve_with(question, self.top_k, self.threshold)
            .await
    }

    pub async fn retrieve_with(
        &self,
        question: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<RetrievalResult> {
        let query = embedding::embed_query(self.embedder.as_ref(), question).await?;
        retrieve(self.index.as_ref(), &query, top_k, threshold).await
    }
}

/// Open the configured index and check it was built with a compatible
/// embedder.
pub async fn open_index(config: &Config, embedder: &dyn Embedder) -> Result<SqliteIndex> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let meta = index.meta();

    if meta.dims != embedder.dims() {
        bail!(
            "Index at {} was built with {}-dimensional embeddings ({}), \
             but the configured embedder '{}' produces {}. Rebuild with `ecris build`.",
            config.index.path.display(),
            meta.dims,
            meta.model,
            embedder.model_name(),
            embedder.dims()
        );
    }
    if meta.model != embedder.model_name() {
        warn!(
            index_model = %meta.model,
            configured_model = %embedder.model_name(),
            "index was built with a different embedding model"
        );
    }

    Ok(index)
}

/// CLI entry point for `ecris retrieve`.
pub async fn run_retrieve(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let index = open_index(config, embedder.as_ref()).await?;
    let retriever = Retriever::new(
        embedder,
        Arc::new(index),
        top_k.unwrap_or(config.retrieval.top_k),
        threshold.unwrap_or(config.retrieval.similarity_threshold),
    );

    let result = retriever.retrieve_text(query).await?;
    if result.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in result.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} #{}",
            i + 1,
            hit.score,
            hit.chunk.source,
            hit.chunk.chunk_index
        );
        let excerpt: String = hit.chunk.text.chars().take(240).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    id: {}", hit.chunk.id);
        println!();
    }

    Ok(())
}

//! Index build orchestration.
//!
//! Coordinates the offline build: loader → chunking → embedding → index.
//! A document that cannot be loaded is skipped with a warning; any embedding
//! or storage failure aborts the build and leaves the previous index (if
//! any) untouched.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{IndexMeta, SqliteIndex, VectorIndex};
use crate::loader::{self, LoadReport};
use crate::models::{Chunk, Document, EmbeddedChunk};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, ProgressMode};

/// What a build or append wrote.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub path: PathBuf,
    pub documents: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
}

/// Chunk every document with the configured window.
pub fn chunk_documents(config: &Config, documents: &[Document]) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            chunk_document(
                doc,
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            )
        })
        .collect()
}

/// Embed chunks in batches of `batch_size`. Fails on the first bad batch.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
    progress: &dyn BuildProgressReporter,
) -> Result<Vec<EmbeddedChunk>> {
    let total = chunks.len() as u64;
    let mut embedded = Vec::with_capacity(chunks.len());
    let mut pending = chunks.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<Chunk> = pending.by_ref().take(batch_size.max(1)).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedding::embed_batch(embedder, &texts)
            .await
            .with_context(|| format!("Failed to embed chunks of {}", batch[0].source))?;

        embedded.extend(
            batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
        );
        progress.report(BuildProgressEvent::Embedding {
            n: embedded.len() as u64,
            total,
        });
    }

    Ok(embedded)
}

/// Build a fresh index from already-loaded documents.
pub async fn build_index_from_documents(
    config: &Config,
    embedder: &dyn Embedder,
    documents: &[Document],
    progress: &dyn BuildProgressReporter,
) -> Result<SqliteIndex> {
    let chunks = chunk_documents(config, documents);
    let entries = embed_chunks(
        embedder,
        chunks,
        config.embedding.batch_size,
        progress,
    )
    .await?;

    progress.report(BuildProgressEvent::Writing {
        entries: entries.len() as u64,
    });

    let meta = IndexMeta {
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        built_at: chrono::Utc::now().timestamp(),
    };
    SqliteIndex::build(&config.index.path, meta, &entries).await
}

/// Load the configured document set and build the index from it.
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildSummary> {
    let paths = loader::configured_paths(&config.documents)?;
    let report = loader::load_documents(&paths);
    progress.report(BuildProgressEvent::Loading {
        documents: report.documents.len() as u64,
    });
    if report.documents.is_empty() {
        warn!("no documents loaded; building an empty index");
    }

    let index = build_index_from_documents(config, embedder, &report.documents, progress).await?;
    let chunks = index.len().await?;
    index.close().await;

    let summary = summarize(config, embedder, &report, chunks);
    info!(
        documents = summary.documents,
        skipped = summary.skipped,
        chunks = summary.chunks,
        "index built"
    );
    Ok(summary)
}

/// Load `paths` and append their chunks to the existing index.
pub async fn append_documents(
    config: &Config,
    embedder: &dyn Embedder,
    paths: &[PathBuf],
    progress: &dyn BuildProgressReporter,
) -> Result<BuildSummary> {
    let existing = SqliteIndex::open(&config.index.path).await?;
    let meta = existing.meta().clone();
    existing.close().await;

    if meta.chunk_size != config.chunking.chunk_size
        || meta.chunk_overlap != config.chunking.chunk_overlap
    {
        warn!(
            index_chunk_size = meta.chunk_size,
            index_chunk_overlap = meta.chunk_overlap,
            "appending with a chunk window different from the one the index was built with"
        );
    }

    let report = loader::load_documents(paths);
    progress.report(BuildProgressEvent::Loading {
        documents: report.documents.len() as u64,
    });

    let chunks = chunk_documents(config, &report.documents);
    let entries = embed_chunks(embedder, chunks, config.embedding.batch_size, progress).await?;
    progress.report(BuildProgressEvent::Writing {
        entries: entries.len() as u64,
    });
    let written = SqliteIndex::append(&config.index.path, &entries).await?;

    Ok(summarize(config, embedder, &report, written))
}

fn summarize(
    config: &Config,
    embedder: &dyn Embedder,
    report: &LoadReport,
    chunks: usize,
) -> BuildSummary {
    BuildSummary {
        path: config.index.path.clone(),
        documents: report.documents.len(),
        skipped: report.warnings.len(),
        chunks,
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
    }
}

/// CLI entry point for `ecris build`.
pub async fn run_build(config: &Config, append: Vec<PathBuf>, mode: ProgressMode) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let reporter = mode.reporter();

    let (label, summary) = if append.is_empty() {
        (
            "build",
            build_index(config, embedder.as_ref(), reporter.as_ref()).await?,
        )
    } else {
        (
            "append",
            append_documents(config, embedder.as_ref(), &append, reporter.as_ref()).await?,
        )
    };

    println!("{} {}", label, summary.path.display());
    println!("  documents: {}", summary.documents);
    println!("  skipped: {}", summary.skipped);
    println!("  chunks written: {}", summary.chunks);
    println!("  model: {} ({} dims)", summary.model, summary.dims);
    println!("ok");
    Ok(())
}

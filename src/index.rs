//! Vector index: durable storage of (chunk, embedding) pairs.
//!
//! The [`VectorIndex`] trait is the read side used at query time. Two
//! implementations exist:
//!
//! - [`SqliteIndex`] — the persisted index. Built in one batch into a
//!   temporary file that is renamed into place only after every entry has
//!   been committed, so a failed build never leaves a partial index where
//!   readers look. Reopened read-only for queries; [`SqliteIndex::append`]
//!   adds entries in a single transaction.
//! - [`MemoryIndex`] — in-process, for tests and embedding in other programs.
//!
//! Similarity search is brute-force cosine similarity; the corpus is a
//! handful of reference documents.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, EmbeddedChunk, ScoredChunk};

/// How an index was built. Stored alongside the entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Unix timestamp of the build.
    pub built_at: i64,
}

/// Read access to a set of embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored vector has.
    fn dims(&self) -> usize;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Up to `limit` entries ordered by descending cosine similarity to `query`.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;
}

/// Every entry must carry a vector of exactly `dims` components.
fn check_entries(dims: usize, entries: &[EmbeddedChunk]) -> Result<()> {
    for entry in entries {
        if entry.vector.len() != dims {
            bail!(
                "Chunk {} of {} has a {}-dimensional embedding; index expects {}",
                entry.chunk.chunk_index,
                entry.chunk.source,
                entry.vector.len(),
                dims
            );
        }
    }
    Ok(())
}

fn rank(mut scored: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    scored.retain(|s| !s.score.is_nan());
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

// ============ In-memory ============

#[derive(Debug, Clone)]
pub struct MemoryIndex {
    dims: usize,
    entries: Vec<EmbeddedChunk>,
}

impl MemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: Vec::new(),
        }
    }

    pub fn build(dims: usize, entries: Vec<EmbeddedChunk>) -> Result<Self> {
        check_entries(dims, &entries)?;
        Ok(Self { dims, entries })
    }

    pub fn append(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        check_entries(self.dims, &entries)?;
        self.entries.extend(entries);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let scored = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        Ok(rank(scored, limit))
    }
}

// ============ SQLite ============

/// Per-source entry counts, for `ecris stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub chunks: i64,
}

/// A persisted index opened read-only.
pub struct SqliteIndex {
    pool: SqlitePool,
    meta: IndexMeta,
}

impl SqliteIndex {
    /// Build a fresh index at `path` from `entries`, replacing any existing
    /// index only once the new one is complete.
    ///
    /// An empty `entries` slice produces a valid, empty index.
    pub async fn build(path: &Path, meta: IndexMeta, entries: &[EmbeddedChunk]) -> Result<Self> {
        check_entries(meta.dims, entries)?;

        let staging = staging_path(path);
        remove_db_files(&staging);

        if let Err(e) = write_index(&staging, &meta, entries).await {
            remove_db_files(&staging);
            return Err(e.context(format!("Failed to build index at {}", path.display())));
        }

        std::fs::rename(&staging, path).with_context(|| {
            format!(
                "Failed to publish index {} -> {}",
                staging.display(),
                path.display()
            )
        })?;
        info!(path = %path.display(), entries = entries.len(), "index published");

        Self::open(path).await
    }

    /// Open a persisted index for querying. Never writes to it.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_read_only(path).await?;
        let meta = read_meta(&pool)
            .await
            .with_context(|| format!("Failed to read index metadata from {}", path.display()))?;
        debug!(path = %path.display(), model = %meta.model, dims = meta.dims, "index opened");
        Ok(Self { pool, meta })
    }

    /// Append entries to the index at `path` in one transaction.
    ///
    /// Returns the number of entries written.
    pub async fn append(path: &Path, entries: &[EmbeddedChunk]) -> Result<usize> {
        if !path.exists() {
            bail!(
                "Index not found at {} (run `ecris build` first)",
                path.display()
            );
        }

        let pool = db::connect(path).await?;
        let meta = read_meta(&pool).await?;
        check_entries(meta.dims, entries)?;

        let mut tx = pool.begin().await?;
        for entry in entries {
            insert_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;
        pool.close().await;

        info!(path = %path.display(), entries = entries.len(), "index appended");
        Ok(entries.len())
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub async fn source_counts(&self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM chunks GROUP BY source ORDER BY n DESC, source",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceCount {
                source: row.get("source"),
                chunks: row.get("n"),
            })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.meta.dims
    }

    async fn len(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, source, chunk_index, char_offset, text, hash, embedding
            FROM chunks
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let offset: i64 = row.get("char_offset");
                ScoredChunk {
                    score: cosine_similarity(query, &vec),
                    chunk: Chunk {
                        id: row.get("id"),
                        document_id: row.get("document_id"),
                        source: row.get("source"),
                        chunk_index: row.get("chunk_index"),
                        char_offset: offset as usize,
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                }
            })
            .collect();

        Ok(rank(scored, limit))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.sqlite".into());
    name.push(".building");
    path.with_file_name(name)
}

fn remove_db_files(path: &Path) {
    let _ = std::fs::remove_file(path);
    let mut journal = path.as_os_str().to_os_string();
    journal.push("-journal");
    let _ = std::fs::remove_file(PathBuf::from(journal));
}

async fn write_index(path: &Path, meta: &IndexMeta, entries: &[EmbeddedChunk]) -> Result<()> {
    let pool = db::connect(path).await?;
    migrate::run_migrations(&pool).await?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO index_meta (id, model, dims, chunk_size, chunk_overlap, built_at)
        VALUES (1, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&meta.model)
    .bind(meta.dims as i64)
    .bind(meta.chunk_size as i64)
    .bind(meta.chunk_overlap as i64)
    .bind(meta.built_at)
    .execute(&mut *tx)
    .await?;

    for entry in entries {
        insert_entry(&mut tx, entry).await?;
    }
    tx.commit().await?;

    pool.close().await;
    Ok(())
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &EmbeddedChunk,
) -> Result<()> {
    let c = &entry.chunk;
    sqlx::query(
        r#"
        INSERT INTO chunks (id, document_id, source, chunk_index, char_offset, text, hash, embedding)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&c.id)
    .bind(&c.document_id)
    .bind(&c.source)
    .bind(c.chunk_index)
    .bind(c.char_offset as i64)
    .bind(&c.text)
    .bind(&c.hash)
    .bind(vec_to_blob(&entry.vector))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn read_meta(pool: &SqlitePool) -> Result<IndexMeta> {
    let row = sqlx::query(
        "SELECT model, dims, chunk_size, chunk_overlap, built_at FROM index_meta WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| anyhow::anyhow!("index metadata missing"))?;

    let dims: i64 = row.get("dims");
    let chunk_size: i64 = row.get("chunk_size");
    let chunk_overlap: i64 = row.get("chunk_overlap");

    Ok(IndexMeta {
        model: row.get("model"),
        dims: dims as usize,
        chunk_size: chunk_size as usize,
        chunk_overlap: chunk_overlap as usize,
        built_at: row.get("built_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(dims: usize) -> IndexMeta {
        IndexMeta {
            model: "test-model".to_string(),
            dims,
            chunk_size: 100,
            chunk_overlap: 10,
            built_at: 1_700_000_000,
        }
    }

    fn entry(source: &str, index: i64, text: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: format!("{}-{}", source, index),
                document_id: format!("doc-{}", source),
                source: source.to_string(),
                chunk_index: index,
                char_offset: 0,
                text: text.to_string(),
                hash: String::new(),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_build_open_and_search() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("ecris.sqlite");

        let entries = vec![
            entry("a.pdf", 0, "respond within 1 hour", vec![1.0, 0.0, 0.0]),
            entry("b.pdf", 0, "unrelated", vec![0.0, 1.0, 0.0]),
            entry("b.pdf", 1, "closer", vec![0.8, 0.2, 0.0]),
        ];
        let built = SqliteIndex::build(&path, meta(3), &entries).await.unwrap();
        assert_eq!(built.len().await.unwrap(), 3);
        built.close().await;

        let index = SqliteIndex::open(&path).await.unwrap();
        assert_eq!(index.meta(), &meta(3));
        let hits = index.nearest(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "respond within 1 hour");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].chunk.text, "closer");

        let counts = index.source_counts().await.unwrap();
        assert_eq!(counts[0].source, "b.pdf");
        assert_eq!(counts[0].chunks, 2);
    }

    #[tokio::test]
    async fn test_empty_build_is_valid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.sqlite");
        let index = SqliteIndex::build(&path, meta(4), &[]).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
        assert!(index.nearest(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ecris.sqlite");
        SqliteIndex::build(&path, meta(2), &[entry("a", 0, "old", vec![1.0, 0.0])])
            .await
            .unwrap()
            .close()
            .await;

        // Duplicate (document_id, chunk_index) fails mid-write.
        let bad = vec![
            entry("b", 0, "new", vec![1.0, 0.0]),
            entry("b", 0, "dup", vec![0.0, 1.0]),
        ];
        assert!(SqliteIndex::build(&path, meta(2), &bad).await.is_err());
        assert!(!staging_path(&path).exists());

        let index = SqliteIndex::open(&path).await.unwrap();
        let hits = index.nearest(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "old");
    }

    #[tokio::test]
    async fn test_build_rejects_wrong_dimensionality() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ecris.sqlite");
        let err = SqliteIndex::build(&path, meta(3), &[entry("a", 0, "x", vec![1.0])])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("index expects 3"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_append_adds_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ecris.sqlite");
        SqliteIndex::build(&path, meta(2), &[entry("a", 0, "first", vec![1.0, 0.0])])
            .await
            .unwrap()
            .close()
            .await;

        let written = SqliteIndex::append(&path, &[entry("b", 0, "second", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert!(SqliteIndex::append(&path, &[entry("c", 0, "bad", vec![1.0])])
            .await
            .is_err());

        let index = SqliteIndex::open(&path).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_open_missing_index_errors() {
        let tmp = TempDir::new().unwrap();
        let err = SqliteIndex::open(&tmp.path().join("nope.sqlite"))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("run `ecris build` first"));
    }

    #[tokio::test]
    async fn test_memory_index_ranks_and_limits() {
        let index = MemoryIndex::build(
            2,
            vec![
                entry("a", 0, "x", vec![1.0, 0.0]),
                entry("a", 1, "y", vec![0.0, 1.0]),
                entry("a", 2, "z", vec![0.7, 0.7]),
            ],
        )
        .unwrap();
        let hits = index.nearest(&[1.0, 0.0], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "z"]);
    }

    #[tokio::test]
    async fn test_nan_embedding_never_ranks() {
        let index = MemoryIndex::build(
            2,
            vec![
                entry("a", 0, "x", vec![1.0, 0.0]),
                entry("a", 1, "broken", vec![f32::NAN, 1.0]),
                entry("a", 2, "z", vec![0.7, 0.7]),
            ],
        )
        .unwrap();
        let hits = index.nearest(&[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "z"]);
    }
}

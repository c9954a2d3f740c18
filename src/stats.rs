//! Index statistics.
//!
//! Summarizes what `ecris build` produced: the embedding model and window
//! the index was built with, its size, and per-source chunk counts.

use anyhow::Result;

use crate::config::Config;
use crate::index::{SqliteIndex, VectorIndex};

/// Run the stats command: open the index read-only and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let meta = index.meta().clone();
    let total_chunks = index.len().await?;
    let by_source = index.source_counts().await?;

    let db_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("E-Cris — Index Stats");
    println!("====================");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Built:       {}", format_ts_iso(meta.built_at));
    println!();
    println!("  Model:       {} ({} dims)", meta.model, meta.dims);
    println!(
        "  Window:      {} chars, {} overlap",
        meta.chunk_size, meta.chunk_overlap
    );
    println!("  Sources:     {}", by_source.len());
    println!("  Chunks:      {}", total_chunks);

    if !by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(57));
        for s in &by_source {
            println!("  {:<48} {:>8}", s.source, s.chunks);
        }
    }

    println!();
    index.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

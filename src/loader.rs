//! Document loader.
//!
//! Turns the configured reference files into [`Document`]s. A file that is
//! missing, unreadable, or fails text extraction is reported as a
//! [`LoadWarning`] and skipped; loading never fails as a whole.
//!
//! The document set comes from `[documents].paths` (explicit list) and,
//! optionally, `[documents].dir` walked with include/exclude globs.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::extract;
use crate::models::Document;

/// A file that was skipped during loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`load_documents`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub warnings: Vec<LoadWarning>,
}

/// Resolve the configured document set to a de-duplicated path list.
///
/// Explicit paths keep their order (missing ones included, so the loader
/// can warn about them); files discovered under `dir` follow, sorted.
pub fn configured_paths(docs: &DocumentsConfig) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    for p in &docs.paths {
        if seen.insert(p.clone()) {
            paths.push(p.clone());
        }
    }

    if let Some(dir) = &docs.dir {
        for p in discover(dir, &docs.include_globs, &docs.exclude_globs)? {
            if seen.insert(p.clone()) {
                paths.push(p);
            }
        }
    }

    Ok(paths)
}

/// Walk `root` and return files matching the include globs and none of the
/// exclude globs, sorted for deterministic ordering.
pub fn discover(root: &Path, include_globs: &[String], exclude_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Document directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(exclude_globs)?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        found.push(path.to_path_buf());
    }

    found.sort();
    Ok(found)
}

/// Load one [`Document`] per readable file, skipping the rest with a warning.
pub fn load_documents(paths: &[PathBuf]) -> LoadReport {
    let mut report = LoadReport::default();

    for path in paths {
        match load_document(path) {
            Ok(doc) => {
                debug!(source = %doc.source, chars = doc.body.chars().count(), "loaded document");
                report.documents.push(doc);
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping document");
                report.warnings.push(LoadWarning {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }

    report
}

fn load_document(path: &Path) -> std::result::Result<Document, String> {
    if !path.exists() {
        return Err("file not found".to_string());
    }

    let bytes = std::fs::read(path).map_err(|e| format!("unreadable: {}", e))?;
    let content_type = extract::content_type_for_path(path);
    let body = extract::extract_text(&bytes, content_type).map_err(|e| e.to_string())?;

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Document {
        id: Uuid::new_v4().to_string(),
        source: path.to_string_lossy().to_string(),
        title,
        content_type: content_type.to_string(),
        body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

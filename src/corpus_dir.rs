//! Corpus directory loader.
//!
//! Walks a directory, applies the `[corpus_dir]` include and exclude globs
//! and turns every matching file into a [`CorpusDocument`] whose id is the
//! path relative to the root. Files are returned sorted by id so repeated
//! loads ingest in the same order.
//!
//! `.git`, `target` and `node_modules` directories are always excluded.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use simcheck_core::{CorpusDocument, OriginTag};

use crate::config::CorpusDirConfig;

/// A file that was found but not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of scanning a directory.
#[derive(Debug, Default)]
pub struct CorpusScan {
    pub documents: Vec<CorpusDocument>,
    pub skipped: Vec<SkippedFile>,
}

/// Load every matching file under `root` as a corpus document with the
/// given origin and author.
///
/// Files that are not valid UTF-8 or exceed `max_bytes` are reported in
/// [`CorpusScan::skipped`] rather than failing the scan.
pub fn scan_corpus_dir(
    root: &Path,
    config: &CorpusDirConfig,
    origin: OriginTag,
    author_id: &str,
    max_bytes: usize,
) -> Result<CorpusScan> {
    if !root.is_dir() {
        bail!("Corpus directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut scan = CorpusScan::default();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_document(path, &rel_str, origin, author_id, max_bytes)? {
            Ok(doc) => scan.documents.push(doc),
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "skipping corpus file");
                scan.skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }

    scan.documents
        .sort_by(|a, b| a.document_id.cmp(&b.document_id));
    scan.skipped.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(scan)
}

/// Outer error: I/O failure. Inner error: the file is unusable.
fn read_document(
    path: &Path,
    relative_path: &str,
    origin: OriginTag,
    author_id: &str,
    max_bytes: usize,
) -> Result<std::result::Result<CorpusDocument, String>> {
    let len = std::fs::metadata(path)?.len();
    if len > max_bytes as u64 {
        return Ok(Err(format!("{} bytes exceeds the {} byte limit", len, max_bytes)));
    }

    let bytes = std::fs::read(path)?;
    let raw_text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            return Ok(Err(format!(
                "invalid UTF-8 at byte {}",
                e.utf8_error().valid_up_to()
            )))
        }
    };

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    Ok(Ok(CorpusDocument {
        document_id: relative_path.to_string(),
        raw_text,
        author_id: author_id.to_string(),
        origin,
        title,
        url: Some(format!("file://{}", path.display())),
    }))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

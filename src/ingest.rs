//! Corpus ingestion commands.
//!
//! `simcheck ingest`, `simcheck ingest-dir` and `simcheck remove`. Documents
//! whose stored body already has the same content hash and metadata are
//! skipped so repeated directory loads leave the corpus version alone.

use anyhow::{Context, Result};
use std::path::Path;

use simcheck_core::models::content_hash;
use simcheck_core::{AnalysisError, CorpusDocument, CorpusStore, IngestOutcome, OriginTag, RunStage};

use crate::config::Config;
use crate::corpus_dir::scan_corpus_dir;
use crate::engine::{open_engine, Engine};
use crate::progress::{ProgressMode, RunProgressEvent, RunProgressReporter};

/// What [`ingest_if_changed`] did with a document.
#[derive(Debug)]
pub enum IngestResult {
    Ingested(IngestOutcome),
    Unchanged,
}

/// Ingest `doc` unless the store already holds an identical copy.
pub async fn ingest_if_changed(
    engine: &Engine,
    doc: CorpusDocument,
) -> Result<IngestResult, AnalysisError> {
    let existing = engine
        .store()
        .get_document(&doc.document_id)
        .await
        .map_err(|e| AnalysisError::storage(RunStage::Pending, e))?;

    if let Some(existing) = existing {
        if existing.content_hash == content_hash(&doc.raw_text)
            && existing.author_id == doc.author_id
            && existing.origin == doc.origin
            && existing.title == doc.title
            && existing.url == doc.url
        {
            return Ok(IngestResult::Unchanged);
        }
    }
    engine.ingest_corpus_document(doc).await.map(IngestResult::Ingested)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    id: Option<String>,
    author: &str,
    origin: OriginTag,
    title: Option<String>,
    url: Option<String>,
    progress: ProgressMode,
) -> Result<()> {
    let raw_text = read_text(path, config.engine.max_document_bytes)?;
    let document_id = id.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    });

    let engine = open_engine(config, progress.reporter()).await?;
    let doc = CorpusDocument {
        document_id: document_id.clone(),
        raw_text,
        author_id: author.to_string(),
        origin,
        title,
        url,
    };

    match ingest_if_changed(&engine, doc).await? {
        IngestResult::Ingested(outcome) => {
            println!("ingest {}", document_id);
            println!("  origin:        {}", origin);
            println!("  replaced:      {}", outcome.replaced);
            println!("  tokens:        {}", outcome.tokens);
            println!("  fingerprints:  {}", outcome.fingerprints);
            println!("  corpus version: {}", outcome.corpus_version);
        }
        IngestResult::Unchanged => {
            println!("ingest {} (unchanged)", document_id);
        }
    }
    println!("ok");

    engine.close().await?;
    Ok(())
}

pub async fn run_ingest_dir(
    config: &Config,
    dir: &Path,
    origin: OriginTag,
    author: &str,
    progress: ProgressMode,
) -> Result<()> {
    let scan = scan_corpus_dir(
        dir,
        &config.corpus_dir,
        origin,
        author,
        config.engine.max_document_bytes,
    )?;

    let reporter = progress.reporter();
    let engine = open_engine(config, progress.reporter()).await?;

    let total = scan.documents.len() as u64;
    let mut ingested = 0u64;
    let mut unchanged = 0u64;
    let mut empty = 0u64;

    for (i, doc) in scan.documents.into_iter().enumerate() {
        let id = doc.document_id.clone();
        match ingest_if_changed(&engine, doc).await {
            Ok(IngestResult::Ingested(_)) => ingested += 1,
            Ok(IngestResult::Unchanged) => unchanged += 1,
            Err(AnalysisError::EmptyDocument { .. }) => {
                tracing::warn!(document_id = %id, "no tokens after normalization; skipping");
                empty += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to ingest {}", id)),
        }
        reporter.report(RunProgressEvent::Ingesting {
            n: i as u64 + 1,
            total,
        });
    }

    let stats = engine.index_stats().await;
    println!("ingest-dir {}", dir.display());
    println!("  files found:   {}", total + scan.skipped.len() as u64);
    println!("  ingested:      {}", ingested);
    println!("  unchanged:     {}", unchanged);
    println!("  skipped:       {}", scan.skipped.len() as u64 + empty);
    for skipped in &scan.skipped {
        println!("    {}: {}", skipped.path.display(), skipped.reason);
    }
    println!("  corpus documents: {}", stats.documents);
    println!("  corpus version:   {}", stats.corpus_version);
    println!("ok");

    engine.close().await?;
    Ok(())
}

pub async fn run_remove(config: &Config, id: &str) -> Result<()> {
    let engine = open_engine(config, ProgressMode::Off.reporter()).await?;
    engine.remove_corpus_document(id).await?;
    println!("removed {}", id);
    engine.close().await?;
    Ok(())
}

/// Read a UTF-8 text file, enforcing the document size limit.
pub fn read_text(path: &Path, max_bytes: usize) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.len() > max_bytes {
        anyhow::bail!(
            "{} is {} bytes; the limit is {} bytes",
            path.display(),
            bytes.len(),
            max_bytes
        );
    }
    String::from_utf8(bytes).map_err(|e| {
        AnalysisError::Encoding {
            document_id: path.display().to_string(),
            offset: e.utf8_error().valid_up_to(),
        }
        .into()
    })
}

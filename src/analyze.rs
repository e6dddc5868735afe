//! `simcheck analyze`: run one submission against the corpus, persist the
//! report record and print it.
//!
//! Ctrl-C cancels the run through the engine's [`CancelToken`].

use anyhow::Result;
use std::path::Path;
use tracing::info;

use simcheck_core::CorpusScope;

use crate::config::Config;
use crate::engine::{open_engine, AnalysisRequest, CancelToken};
use crate::get::print_record;
use crate::ingest::read_text;
use crate::progress::ProgressMode;

/// Command-line inputs for one analysis.
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub id: Option<String>,
    pub author: String,
    pub scope: CorpusScope,
    pub title: Option<String>,
    pub register: bool,
    pub json: bool,
}

pub async fn run_analyze(
    config: &Config,
    path: &Path,
    args: AnalyzeArgs,
    progress: ProgressMode,
) -> Result<()> {
    let raw_text = read_text(path, config.engine.max_document_bytes)?;
    let document_id = args.id.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    });

    let engine = open_engine(config, progress.reporter()).await?;
    let request = AnalysisRequest {
        document_id,
        raw_text,
        author_id: args.author,
        corpus_scope: args.scope,
        title: args.title,
        register: args.register,
    };

    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; cancelling analysis");
                cancel.cancel();
            }
        })
    };

    let result = engine.analyze_and_record(&request, &cancel).await;
    watcher.abort();
    engine.close().await?;

    let record = result?;
    print_record(&record, args.json)
}

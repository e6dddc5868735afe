//! Concurrent analysis engine.
//!
//! Owns the [`FingerprintIndex`] and a [`CorpusStore`] and runs the core
//! pipeline with the guarantees the CLI and HTTP server rely on:
//!
//! - The index sits behind an async `RwLock`. Ingestion tokenizes outside
//!   the lock and holds the write lock only to swap postings.
//! - Ingestion and removal of one document id are serialized by a per-id
//!   mutex; other ids proceed independently.
//! - An analysis snapshots its candidates under the read lock, then aligns
//!   them on blocking worker tasks bounded by a semaphore. Results are
//!   merged by sorting, so completion order never affects the report.
//! - A [`CancelToken`] is checked before each alignment starts and after
//!   each completes. The whole run is bounded by `run_timeout`.
//!
//! Source bodies are fetched from the store per candidate. A body that
//! cannot be loaded, or a worker that fails, costs only that candidate:
//! it is logged at `warn` and skipped.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use simcheck_core::analysis::{align_candidate, finish, prepare_query};
use simcheck_core::candidate::find_candidates;
use simcheck_core::models::{CorpusDocument, StageCell};
use simcheck_core::score::SourceMatch;
use simcheck_core::store::{CorpusStore, ReportRecord};
use simcheck_core::{
    AnalysisError, AnalysisParams, AnalysisReport, CorpusScope, DocumentEntry, FingerprintIndex,
    IndexStats, IngestOutcome, OriginTag, RunStage, StoredDocument,
};

use crate::config::Config;
use crate::progress::{NoProgress, RunProgressEvent, RunProgressReporter};
use crate::sqlite_store::SqliteStore;

const META_SHINGLE_K: &str = "shingle_k";
const META_WINNOW_WINDOW: &str = "winnow_window";

/// Engine tunables, usually built from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub params: AnalysisParams,
    pub concurrency: usize,
    pub run_timeout: Duration,
    pub max_document_bytes: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            params: config.analysis_params(),
            concurrency: config.engine.concurrency,
            run_timeout: config.engine.run_timeout(),
            max_document_bytes: config.engine.max_document_bytes,
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancels its token when dropped, so blocking work queued by a run that
/// timed out or was dropped does not start.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// A submission to analyze.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub document_id: String,
    pub raw_text: String,
    pub author_id: String,
    #[serde(default)]
    pub corpus_scope: CorpusScope,
    #[serde(default)]
    pub title: Option<String>,
    /// Add the submission to the internal corpus once the run completes.
    #[serde(default)]
    pub register: bool,
}

/// The similarity engine. Share it behind an `Arc`.
pub struct Engine {
    store: Arc<dyn CorpusStore>,
    index: RwLock<FingerprintIndex>,
    doc_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    workers: Arc<Semaphore>,
    settings: EngineSettings,
    progress: Arc<dyn RunProgressReporter>,
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

impl Engine {
    /// Load every stored document, rebuild the index and verify it.
    ///
    /// If the stored shingle parameters differ from `settings`, the rebuild
    /// uses the new ones and the change is logged.
    pub async fn open(
        store: Arc<dyn CorpusStore>,
        settings: EngineSettings,
    ) -> Result<Self, AnalysisError> {
        settings.params.validate()?;
        if settings.concurrency == 0 {
            return Err(AnalysisError::InvalidParams(
                "engine concurrency must be >= 1".to_string(),
            ));
        }
        let storage = |e| AnalysisError::storage(RunStage::Pending, e);
        let shingle = settings.params.shingle;

        let stored_k = store.get_meta(META_SHINGLE_K).await.map_err(storage)?;
        let stored_w = store.get_meta(META_WINNOW_WINDOW).await.map_err(storage)?;
        let k = shingle.k.to_string();
        let w = shingle.window.to_string();
        if let (Some(old_k), Some(old_w)) = (&stored_k, &stored_w) {
            if *old_k != k || *old_w != w {
                info!(
                    old_k = %old_k,
                    old_window = %old_w,
                    new_k = shingle.k,
                    new_window = shingle.window,
                    "shingle parameters changed; rebuilding index from stored bodies"
                );
            }
        }
        store.set_meta(META_SHINGLE_K, &k).await.map_err(storage)?;
        store.set_meta(META_WINNOW_WINDOW, &w).await.map_err(storage)?;

        let mut index = FingerprintIndex::new(shingle)?;
        let docs = store.list_documents().await.map_err(storage)?;
        for doc in &docs {
            let entry = DocumentEntry::prepare(doc, shingle)?;
            index.ingest(entry)?;
        }
        let stats = index.verify()?;
        info!(
            documents = stats.documents,
            postings = stats.postings,
            k = stats.k,
            winnow_window = stats.winnow_window,
            "corpus index ready"
        );

        Ok(Self {
            store,
            index: RwLock::new(index),
            doc_locks: std::sync::Mutex::new(HashMap::new()),
            workers: Arc::new(Semaphore::new(settings.concurrency)),
            settings,
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_progress(mut self, progress: Box<dyn RunProgressReporter>) -> Self {
        self.progress = Arc::from(progress);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn CorpusStore> {
        &self.store
    }

    pub async fn corpus_version(&self) -> u64 {
        self.index.read().await.version()
    }

    pub async fn index_stats(&self) -> IndexStats {
        self.index.read().await.stats()
    }

    /// Check the in-memory index against the documents it holds.
    pub async fn verify(&self) -> Result<IndexStats, AnalysisError> {
        self.index.read().await.verify()
    }

    /// Every posting as `(hash, document id, offset)`, sorted.
    pub async fn occurrences(&self) -> Vec<(u64, String, u32)> {
        self.index.read().await.occurrences()
    }

    fn doc_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .doc_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    fn release_doc_lock(&self, id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .doc_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference held by the map, one by the caller.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(id);
        }
    }

    fn check_size(&self, document_id: &str, len: usize) -> Result<(), AnalysisError> {
        if len > self.settings.max_document_bytes {
            return Err(AnalysisError::InvalidParams(format!(
                "document {} is {} bytes; the limit is {} bytes",
                document_id, len, self.settings.max_document_bytes
            )));
        }
        Ok(())
    }

    /// Add or replace a corpus document.
    pub async fn ingest_corpus_document(
        &self,
        doc: CorpusDocument,
    ) -> Result<IngestOutcome, AnalysisError> {
        if doc.document_id.trim().is_empty() {
            return Err(AnalysisError::InvalidParams(
                "document_id must not be empty".to_string(),
            ));
        }
        self.check_size(&doc.document_id, doc.raw_text.len())?;

        let id = doc.document_id.clone();
        let lock = self.doc_lock(&id);
        let result = {
            let _guard = lock.lock().await;
            self.ingest_locked(doc).await
        };
        self.release_doc_lock(&id, lock);
        result
    }

    async fn ingest_locked(&self, doc: CorpusDocument) -> Result<IngestOutcome, AnalysisError> {
        let stored = StoredDocument::from_corpus(doc, now_secs());
        let entry = DocumentEntry::prepare(&stored, self.settings.params.shingle)?;

        self.store
            .put_document(&stored)
            .await
            .map_err(|e| AnalysisError::storage(RunStage::Pending, e))?;

        let outcome = self.index.write().await.ingest(entry)?;
        info!(
            document_id = %outcome.document_id,
            origin = %stored.origin,
            replaced = outcome.replaced,
            tokens = outcome.tokens,
            fingerprints = outcome.fingerprints,
            "ingested corpus document"
        );
        Ok(outcome)
    }

    /// Remove a corpus document. `NotFound` if neither the store nor the
    /// index knew it.
    pub async fn remove_corpus_document(&self, document_id: &str) -> Result<(), AnalysisError> {
        let lock = self.doc_lock(document_id);
        let result = {
            let _guard = lock.lock().await;
            self.remove_locked(document_id).await
        };
        self.release_doc_lock(document_id, lock);
        result
    }

    async fn remove_locked(&self, document_id: &str) -> Result<(), AnalysisError> {
        let existed = self
            .store
            .delete_document(document_id)
            .await
            .map_err(|e| AnalysisError::storage(RunStage::Pending, e))?;
        let removed = self.index.write().await.remove(document_id);
        if !existed && !removed {
            return Err(AnalysisError::NotFound {
                document_id: document_id.to_string(),
            });
        }
        info!(document_id, "removed corpus document");
        Ok(())
    }

    /// Analyze a submission against the corpus.
    ///
    /// Fails with `Cancelled` if `cancel` fires, with `Timeout` if the run
    /// exceeds the configured budget. No partial report is ever returned.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        let stage = StageCell::new(RunStage::Pending);

        let outcome = if self.settings.run_timeout.is_zero() {
            Err(self.timeout_error(request, &stage, started))
        } else {
            match tokio::time::timeout(
                self.settings.run_timeout,
                self.run_analysis(request, cancel, &stage),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(self.timeout_error(request, &stage, started)),
            }
        };

        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                match &err {
                    AnalysisError::Cancelled { .. } => info!(document_id = %request.document_id, "analysis cancelled"),
                    other => warn!(document_id = %request.document_id, error = %other, "analysis failed"),
                }
                stage.set(RunStage::Failed);
                self.report_stage(&request.document_id, RunStage::Failed);
                return Err(err);
            }
        };

        info!(
            document_id = %report.document_id,
            similarity = report.similarity,
            risk = %report.risk,
            sources = report.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis completed"
        );

        if request.register {
            self.ingest_corpus_document(CorpusDocument {
                document_id: request.document_id.clone(),
                raw_text: request.raw_text.clone(),
                author_id: request.author_id.clone(),
                origin: OriginTag::Internal,
                title: request.title.clone(),
                url: None,
            })
            .await?;
        }

        Ok(report)
    }

    /// Run [`analyze`](Self::analyze) and persist the result with a fresh
    /// run id.
    pub async fn analyze_and_record(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
    ) -> Result<ReportRecord, AnalysisError> {
        let report = self.analyze(request, cancel).await?;
        let record = ReportRecord {
            run_id: Uuid::new_v4().to_string(),
            document_id: request.document_id.clone(),
            author_id: request.author_id.clone(),
            title: request.title.clone(),
            analyzed_at: now_secs(),
            report,
        };
        self.store
            .save_report(&record)
            .await
            .map_err(|e| AnalysisError::storage(RunStage::Completed, e))?;
        Ok(record)
    }

    fn timeout_error(
        &self,
        request: &AnalysisRequest,
        stage: &StageCell,
        started: Instant,
    ) -> AnalysisError {
        AnalysisError::Timeout {
            document_id: request.document_id.clone(),
            stage: stage.get(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn report_stage(&self, document_id: &str, stage: RunStage) {
        debug!(document_id, stage = %stage, "run stage");
        self.progress.report(RunProgressEvent::Stage {
            document_id: document_id.to_string(),
            stage,
        });
    }

    fn enter(&self, document_id: &str, cell: &StageCell, stage: RunStage) {
        cell.set(stage);
        self.report_stage(document_id, stage);
    }

    async fn run_analysis(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
        stage: &StageCell,
    ) -> Result<AnalysisReport, AnalysisError> {
        let document_id = request.document_id.as_str();
        let cancelled = |stage: RunStage| AnalysisError::Cancelled {
            document_id: document_id.to_string(),
            stage,
        };
        let params = self.settings.params;

        if request.corpus_scope.is_empty() {
            return Err(AnalysisError::InvalidParams(
                "corpus_scope must include at least one origin".to_string(),
            ));
        }
        self.check_size(document_id, request.raw_text.len())?;

        self.enter(document_id, stage, RunStage::Tokenizing);
        let query = prepare_query(
            document_id,
            &request.author_id,
            request.raw_text.clone(),
            &params.shingle,
        )?;
        if cancel.is_cancelled() {
            return Err(cancelled(RunStage::Tokenizing));
        }

        self.enter(document_id, stage, RunStage::Matching);
        let (candidates, corpus_version) = {
            let index = self.index.read().await;
            let candidates = find_candidates(
                &index,
                document_id,
                &query.fingerprints,
                &request.corpus_scope,
                &params.matching,
            )?;
            (candidates, index.version())
        };
        debug!(document_id, candidates = candidates.len(), corpus_version, "candidates selected");

        self.enter(document_id, stage, RunStage::Aligning);
        let total = candidates.len() as u64;
        let query = Arc::new(query);
        let abandoned = CancelToken::new();
        let _abandon_guard = CancelOnDrop(abandoned.clone());
        let mut tasks: JoinSet<Option<Result<SourceMatch, AnalysisError>>> = JoinSet::new();

        for candidate in candidates {
            if cancel.is_cancelled() {
                tasks.abort_all();
                return Err(cancelled(RunStage::Aligning));
            }
            let store = Arc::clone(&self.store);
            let workers = Arc::clone(&self.workers);
            let query = Arc::clone(&query);
            let cancel = cancel.clone();
            let abandoned = abandoned.clone();

            tasks.spawn(async move {
                let _permit = workers.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let source_id = candidate.entry.id.clone();
                let text = match store.get_document(&source_id).await {
                    Ok(Some(doc)) if doc.content_hash == candidate.entry.content_hash => doc.body,
                    Ok(Some(_)) => {
                        warn!(source_id = %source_id, "source changed since candidate selection; skipping");
                        return None;
                    }
                    Ok(None) => {
                        warn!(source_id = %source_id, "source body missing from store; skipping");
                        return None;
                    }
                    Err(e) => {
                        warn!(source_id = %source_id, error = %format!("{:#}", e), "failed to load source body; skipping");
                        return None;
                    }
                };
                let joined = tokio::task::spawn_blocking(move || {
                    if cancel.is_cancelled() || abandoned.is_cancelled() {
                        return None;
                    }
                    Some(align_candidate(&query, &candidate, text, &params))
                })
                .await;
                match joined {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(source_id = %source_id, error = %e, "alignment worker failed; skipping");
                        None
                    }
                }
            });
        }

        let mut matches: Vec<SourceMatch> = Vec::new();
        let mut done = 0u64;
        while let Some(joined) = tasks.join_next().await {
            if cancel.is_cancelled() {
                tasks.abort_all();
                return Err(cancelled(RunStage::Aligning));
            }
            match joined {
                Ok(Some(Ok(source_match))) => matches.push(source_match),
                Ok(Some(Err(err))) => {
                    tasks.abort_all();
                    return Err(err);
                }
                Ok(None) => {}
                Err(e) => warn!(document_id, error = %e, "alignment task failed; skipping"),
            }
            done += 1;
            self.progress.report(RunProgressEvent::Aligned {
                document_id: document_id.to_string(),
                done,
                total,
            });
        }

        self.enter(document_id, stage, RunStage::Scoring);
        let report = finish(&query, corpus_version, matches, &params);
        self.enter(document_id, stage, RunStage::Completed);
        Ok(report)
    }

    /// Flush and close the store.
    pub async fn close(&self) -> Result<(), AnalysisError> {
        self.store
            .close()
            .await
            .map_err(|e| AnalysisError::storage(RunStage::Completed, e))
    }
}

/// Open the configured SQLite database and build an engine over it.
pub async fn open_engine(
    config: &Config,
    progress: Box<dyn RunProgressReporter>,
) -> anyhow::Result<Engine> {
    let store = SqliteStore::open(config).await?;
    let engine = Engine::open(Arc::new(store), EngineSettings::from_config(config))
        .await?
        .with_progress(progress);
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn request_defaults_to_full_scope() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"document_id":"d","raw_text":"hello there","author_id":"a"}"#,
        )
        .unwrap();
        assert_eq!(request.corpus_scope, CorpusScope::all());
        assert!(!request.register);
        assert!(request.title.is_none());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = Config::minimal();
        config.engine.concurrency = 9;
        config.engine.run_timeout_secs = 3;
        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.concurrency, 9);
        assert_eq!(settings.run_timeout, Duration::from_secs(3));
        assert_eq!(settings.params, AnalysisParams::default());
    }
}

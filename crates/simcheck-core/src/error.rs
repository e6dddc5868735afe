//! Error taxonomy for ingestion and analysis runs.
//!
//! Every fatal error carries the document id and, where it applies, the
//! [`RunStage`] the run had reached, so callers can retry or hand the
//! failure to a human reviewer. Errors that only cost recall (a single
//! candidate whose source text cannot be loaded) are not represented
//! here; the engine logs and skips them.

use thiserror::Error;

use crate::models::RunStage;

/// Errors returned by the tokenizer, the fingerprint index and analysis runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The input is not valid UTF-8. Fatal for that document only.
    #[error("document {document_id}: invalid UTF-8 at byte {offset}")]
    Encoding { document_id: String, offset: usize },

    /// The input produced no tokens after normalization.
    #[error("document {document_id}: no tokens after normalization")]
    EmptyDocument { document_id: String },

    /// Postings disagree with the documents they reference. Requires a
    /// full reingestion; never patched in place.
    #[error("fingerprint index corrupted: {detail}")]
    IndexCorruption { detail: String },

    /// The run exceeded its time budget. Retryable with a reduced scope.
    #[error("analysis of {document_id} timed out during {stage} after {elapsed_ms} ms")]
    Timeout {
        document_id: String,
        stage: RunStage,
        elapsed_ms: u64,
    },

    /// The caller cancelled the run. No report is produced.
    #[error("analysis of {document_id} cancelled during {stage}")]
    Cancelled { document_id: String, stage: RunStage },

    #[error("document not found: {document_id}")]
    NotFound { document_id: String },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The backing store failed while the run was at `stage`.
    #[error("storage failure during {stage}: {message}")]
    Storage { stage: RunStage, message: String },
}

impl AnalysisError {
    /// Wrap a store error, keeping the full context chain in the message.
    pub fn storage(stage: RunStage, err: anyhow::Error) -> Self {
        AnalysisError::Storage {
            stage,
            message: format!("{:#}", err),
        }
    }

    /// Machine-readable code used by the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Encoding { .. } => "encoding_error",
            AnalysisError::EmptyDocument { .. } => "empty_document",
            AnalysisError::IndexCorruption { .. } => "index_corruption",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::Cancelled { .. } => "cancelled",
            AnalysisError::NotFound { .. } => "not_found",
            AnalysisError::InvalidParams(_) => "bad_request",
            AnalysisError::Storage { .. } => "internal",
        }
    }

    /// Whether the caller may retry the same request (possibly with a
    /// narrower corpus scope).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Timeout { .. } | AnalysisError::Storage { .. }
        )
    }
}

//! Storage abstraction for simcheck.
//!
//! The [`CorpusStore`] trait covers everything the engine persists: corpus
//! document bodies, completed report records, and a small key/value table
//! of index metadata. Backends are pluggable (SQLite in the app crate,
//! [`memory::InMemoryStore`] for tests and embedders).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{RiskTier, StoredDocument};
use crate::report::AnalysisReport;

/// A completed analysis run as persisted.
///
/// The run id and timestamp live here rather than in the report so that
/// the report itself stays deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub run_id: String,
    pub document_id: String,
    pub author_id: String,
    pub title: Option<String>,
    /// Unix seconds.
    pub analyzed_at: i64,
    pub report: AnalysisReport,
}

impl ReportRecord {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            run_id: self.run_id.clone(),
            document_id: self.document_id.clone(),
            author_id: self.author_id.clone(),
            title: self.title.clone(),
            analyzed_at: self.analyzed_at,
            similarity: self.report.similarity,
            risk: self.report.risk,
            self_plagiarism: self.report.self_plagiarism,
            match_count: self.report.match_count,
        }
    }
}

/// One row of the report history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub run_id: String,
    pub document_id: String,
    pub author_id: String,
    pub title: Option<String>,
    pub analyzed_at: i64,
    pub similarity: u8,
    pub risk: RiskTier,
    pub self_plagiarism: bool,
    pub match_count: usize,
}

/// Selection over the report history, as shown by history listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryFilter {
    /// Keep only runs classified into this tier.
    #[serde(default)]
    pub risk: Option<RiskTier>,
    /// Case-insensitive substring of the title, author or document id.
    #[serde(default)]
    pub search: Option<String>,
    /// Maximum rows returned, newest first.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn is_unfiltered(&self) -> bool {
        self.risk.is_none() && self.search.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    pub fn matches(&self, summary: &ReportSummary) -> bool {
        if let Some(risk) = self.risk {
            if summary.risk != risk {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                summary
                    .title
                    .as_deref()
                    .map_or(false, |t| t.to_lowercase().contains(&needle))
                    || summary.author_id.to_lowercase().contains(&needle)
                    || summary.document_id.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    /// Filter newest-first summaries and apply the limit.
    pub fn apply(&self, summaries: Vec<ReportSummary>) -> Vec<ReportSummary> {
        let limit = self.limit.unwrap_or(usize::MAX);
        summaries
            .into_iter()
            .filter(|s| self.matches(s))
            .take(limit)
            .collect()
    }
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put_document`](CorpusStore::put_document) | Insert or replace a corpus document |
/// | [`delete_document`](CorpusStore::delete_document) | Remove a corpus document |
/// | [`get_document`](CorpusStore::get_document) | Fetch one document with its body |
/// | [`list_documents`](CorpusStore::list_documents) | All documents, ordered by id (index rebuild) |
/// | [`save_report`](CorpusStore::save_report) | Persist a completed run |
/// | [`get_report`](CorpusStore::get_report) | Fetch a run by id |
/// | [`list_reports`](CorpusStore::list_reports) | Recent runs, newest first |
/// | [`get_meta`](CorpusStore::get_meta) / [`set_meta`](CorpusStore::set_meta) | Index metadata |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Insert or replace a document. Returns `true` if a document with the
    /// same id was replaced.
    async fn put_document(&self, doc: &StoredDocument) -> Result<bool>;

    /// Returns `true` if the document existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn get_document(&self, id: &str) -> Result<Option<StoredDocument>>;

    async fn list_documents(&self) -> Result<Vec<StoredDocument>>;

    async fn save_report(&self, record: &ReportRecord) -> Result<()>;

    async fn get_report(&self, run_id: &str) -> Result<Option<ReportRecord>>;

    /// Most recent runs first; `limit` of `None` returns all.
    async fn list_reports(&self, limit: Option<usize>) -> Result<Vec<ReportSummary>>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Flush and release resources. The store must not be used afterwards.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(run_id: &str, title: Option<&str>, author: &str, risk: RiskTier) -> ReportSummary {
        ReportSummary {
            run_id: run_id.to_string(),
            document_id: format!("doc-{}", run_id),
            author_id: author.to_string(),
            title: title.map(str::to_string),
            analyzed_at: 0,
            similarity: 0,
            risk,
            self_plagiarism: false,
            match_count: 0,
        }
    }

    fn history() -> Vec<ReportSummary> {
        vec![
            summary("r1", Some("Urban Mobility in Luanda"), "ana", RiskTier::Medium),
            summary("r2", Some("Oil Sector Economics"), "pedro", RiskTier::High),
            summary("r3", None, "Ana Ferreira", RiskTier::Low),
            summary("r4", Some("Water Resources"), "antonio", RiskTier::High),
        ]
    }

    fn ids(rows: &[ReportSummary]) -> Vec<&str> {
        rows.iter().map(|s| s.run_id.as_str()).collect()
    }

    #[test]
    fn default_filter_keeps_everything() {
        let filter = HistoryFilter::default();
        assert!(filter.is_unfiltered());
        assert_eq!(ids(&filter.apply(history())), vec!["r1", "r2", "r3", "r4"]);
    }

    #[test]
    fn risk_and_limit() {
        let filter = HistoryFilter {
            risk: Some(RiskTier::High),
            limit: Some(1),
            ..HistoryFilter::default()
        };
        assert_eq!(ids(&filter.apply(history())), vec!["r2"]);
    }

    #[test]
    fn search_matches_title_author_or_id_case_insensitively() {
        let by_author = HistoryFilter {
            search: Some("ANA".to_string()),
            ..HistoryFilter::default()
        };
        assert_eq!(ids(&by_author.apply(history())), vec!["r1", "r3"]);

        let by_title = HistoryFilter {
            search: Some("oil sector".to_string()),
            ..HistoryFilter::default()
        };
        assert_eq!(ids(&by_title.apply(history())), vec!["r2"]);

        let by_id = HistoryFilter {
            search: Some("doc-r4".to_string()),
            ..HistoryFilter::default()
        };
        assert_eq!(ids(&by_id.apply(history())), vec!["r4"]);

        let blank = HistoryFilter {
            search: Some("   ".to_string()),
            ..HistoryFilter::default()
        };
        assert!(blank.is_unfiltered());
    }
}

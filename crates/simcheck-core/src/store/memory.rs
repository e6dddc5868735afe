//! In-memory [`CorpusStore`] implementation for tests and embedders.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`, so listings come back in
//! id order without sorting.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::StoredDocument;

use super::{CorpusStore, ReportRecord, ReportSummary};

/// In-memory store; nothing survives the process.
pub struct InMemoryStore {
    docs: RwLock<BTreeMap<String, StoredDocument>>,
    reports: RwLock<BTreeMap<String, ReportRecord>>,
    meta: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            reports: RwLock::new(BTreeMap::new()),
            meta: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl CorpusStore for InMemoryStore {
    async fn put_document(&self, doc: &StoredDocument) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        Ok(docs.insert(doc.id.clone(), doc.clone()).is_some())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        Ok(docs.remove(id).is_some())
    }

    async fn get_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.values().cloned().collect())
    }

    async fn save_report(&self, record: &ReportRecord) -> Result<()> {
        let mut reports = self.reports.write().map_err(poisoned)?;
        reports.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn get_report(&self, run_id: &str) -> Result<Option<ReportRecord>> {
        let reports = self.reports.read().map_err(poisoned)?;
        Ok(reports.get(run_id).cloned())
    }

    async fn list_reports(&self, limit: Option<usize>) -> Result<Vec<ReportSummary>> {
        let reports = self.reports.read().map_err(poisoned)?;
        let mut summaries: Vec<ReportSummary> = reports.values().map(ReportRecord::summary).collect();
        summaries.sort_by(|a, b| {
            b.analyzed_at
                .cmp(&a.analyzed_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        if let Some(n) = limit {
            summaries.truncate(n);
        }
        Ok(summaries)
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let meta = self.meta.read().map_err(poisoned)?;
        Ok(meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let mut meta = self.meta.write().map_err(poisoned)?;
        meta.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

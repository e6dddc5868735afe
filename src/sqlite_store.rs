//! SQLite-backed [`CorpusStore`] implementation.
//!
//! Documents live in `corpus_documents`, completed runs in
//! `analysis_reports` (summary columns plus the full report as JSON), and
//! index parameters in `index_meta`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use simcheck_core::models::{OriginTag, RiskTier, StoredDocument};
use simcheck_core::report::AnalysisReport;
use simcheck_core::store::{CorpusStore, ReportRecord, ReportSummary};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`CorpusStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await.context("Failed to apply schema")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_document(row: &SqliteRow) -> Result<StoredDocument> {
    let origin: String = row.get("origin");
    Ok(StoredDocument {
        id: row.get("id"),
        author_id: row.get("author_id"),
        origin: origin.parse::<OriginTag>().map_err(|e| anyhow!(e))?,
        title: row.get("title"),
        url: row.get("url"),
        body: row.get("body"),
        ingested_at: row.get("ingested_at"),
        content_hash: row.get("content_hash"),
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<ReportSummary> {
    let risk: String = row.get("risk");
    let similarity: i64 = row.get("similarity");
    let match_count: i64 = row.get("match_count");
    Ok(ReportSummary {
        run_id: row.get("run_id"),
        document_id: row.get("document_id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        analyzed_at: row.get("analyzed_at"),
        similarity: u8::try_from(similarity).context("similarity out of range")?,
        risk: risk.parse::<RiskTier>().map_err(|e| anyhow!(e))?,
        self_plagiarism: row.get::<i64, _>("self_plagiarism") != 0,
        match_count: usize::try_from(match_count).context("match_count out of range")?,
    })
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn put_document(&self, doc: &StoredDocument) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM corpus_documents WHERE id = ?")
            .bind(&doc.id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO corpus_documents (id, author_id, origin, title, url, body,
                                          ingested_at, content_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                author_id = excluded.author_id,
                origin = excluded.origin,
                title = excluded.title,
                url = excluded.url,
                body = excluded.body,
                ingested_at = excluded.ingested_at,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.author_id)
        .bind(doc.origin.as_str())
        .bind(&doc.title)
        .bind(&doc.url)
        .bind(&doc.body)
        .bind(doc.ingested_at)
        .bind(&doc.content_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(existing > 0)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM corpus_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, author_id, origin, title, url, body, ingested_at, content_hash \
             FROM corpus_documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT id, author_id, origin, title, url, body, ingested_at, content_hash \
             FROM corpus_documents ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn save_report(&self, record: &ReportRecord) -> Result<()> {
        let report_json = serde_json::to_string(&record.report)?;
        sqlx::query(
            r#"
            INSERT INTO analysis_reports (run_id, document_id, author_id, title, analyzed_at,
                                          similarity, risk, self_plagiarism, match_count,
                                          report_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.run_id)
        .bind(&record.document_id)
        .bind(&record.author_id)
        .bind(&record.title)
        .bind(record.analyzed_at)
        .bind(i64::from(record.report.similarity))
        .bind(record.report.risk.as_str())
        .bind(record.report.self_plagiarism)
        .bind(record.report.match_count as i64)
        .bind(&report_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save report {}", record.run_id))?;
        Ok(())
    }

    async fn get_report(&self, run_id: &str) -> Result<Option<ReportRecord>> {
        let row = sqlx::query(
            "SELECT run_id, document_id, author_id, title, analyzed_at, report_json \
             FROM analysis_reports WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };
        let report_json: String = row.get("report_json");
        let report: AnalysisReport = serde_json::from_str(&report_json)
            .with_context(|| format!("Corrupt report JSON for run {}", run_id))?;
        Ok(Some(ReportRecord {
            run_id: row.get("run_id"),
            document_id: row.get("document_id"),
            author_id: row.get("author_id"),
            title: row.get("title"),
            analyzed_at: row.get("analyzed_at"),
            report,
        }))
    }

    async fn list_reports(&self, limit: Option<usize>) -> Result<Vec<ReportSummary>> {
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT run_id, document_id, author_id, title, analyzed_at, similarity, risk, \
                    self_plagiarism, match_count \
             FROM analysis_reports ORDER BY analyzed_at DESC, run_id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_summary).collect()
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the configured database. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corpus_documents (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            origin TEXT NOT NULL,
            title TEXT,
            url TEXT,
            body TEXT NOT NULL,
            ingested_at INTEGER NOT NULL,
            content_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_reports (
            run_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            title TEXT,
            analyzed_at INTEGER NOT NULL,
            similarity INTEGER NOT NULL,
            risk TEXT NOT NULL,
            self_plagiarism INTEGER NOT NULL,
            match_count INTEGER NOT NULL,
            report_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_corpus_documents_origin ON corpus_documents(origin)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_reports_analyzed_at ON analysis_reports(analyzed_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_reports_document ON analysis_reports(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}

//! Report retrieval and rendering.
//!
//! `simcheck report <run-id>` loads a persisted [`ReportRecord`]; the same
//! renderer prints fresh results from `simcheck analyze`.

use anyhow::{bail, Result};

use simcheck_core::store::ReportRecord;
use simcheck_core::CorpusStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn get_report(store: &dyn CorpusStore, run_id: &str) -> Result<ReportRecord> {
    match store.get_report(run_id).await? {
        Some(record) => Ok(record),
        None => bail!("report not found: {}", run_id),
    }
}

/// CLI entry point: load a report and print it to stdout.
pub async fn run_report(config: &Config, run_id: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let record = get_report(&store, run_id).await;
    store.close().await?;
    print_record(&record?, json)
}

pub fn print_record(record: &ReportRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    let report = &record.report;
    println!("--- Report ---");
    println!("run_id:          {}", record.run_id);
    println!("document:        {}", record.document_id);
    if let Some(ref title) = record.title {
        println!("title:           {}", title);
    }
    println!("author:          {}", record.author_id);
    println!("analyzed_at:     {}", format_ts_iso(record.analyzed_at));
    println!("corpus_version:  {}", report.corpus_version);
    println!();
    println!("similarity:      {}%", report.similarity);
    println!("risk:            {}", report.risk);
    println!("self_plagiarism: {}", report.self_plagiarism);
    println!(
        "matched tokens:  {} / {}",
        report.matched_tokens, report.query_tokens
    );
    println!();

    println!("--- Sources ({}) ---", report.sources.len());
    for (rank, source) in report.sources.iter().enumerate() {
        println!(
            "{}. [{:>3}%] {} ({})",
            rank + 1,
            source.similarity,
            source.title.as_deref().unwrap_or(&source.id),
            source.origin
        );
        println!("   id:    {}", source.id);
        if let Some(ref url) = source.url {
            println!("   url:   {}", url);
        }
        if source.same_author {
            println!("   same author");
        }
        println!("   spans: {}", source.total_spans);
        println!("   matched:  \"{}\"", source.matched_text);
        println!("   original: \"{}\"", source.original_text);
        println!();
    }

    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

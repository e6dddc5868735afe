//! Corpus and report statistics.
//!
//! Documents per origin and fingerprint counts come from the live index;
//! the risk distribution and originality rate come from the persisted
//! report history. Used by `simcheck stats` and `GET /stats`.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use simcheck_core::{CorpusStore, IndexStats, RiskTier};

use crate::config::Config;
use crate::engine::{open_engine, Engine};
use crate::get::format_ts_iso;
use crate::progress::ProgressMode;

/// Aggregate view over the report history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStats {
    pub total: usize,
    pub by_risk: BTreeMap<RiskTier, usize>,
    pub self_plagiarism: usize,
    /// Mean of `100 - similarity` over all runs; `None` without runs.
    pub originality_rate: Option<f64>,
    /// Unix seconds of the most recent run.
    pub last_analyzed_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub corpus: IndexStats,
    pub reports: ReportStats,
}

pub async fn collect_stats(engine: &Engine) -> Result<StatsResponse> {
    let corpus = engine.index_stats().await;
    let summaries = engine.store().list_reports(None).await?;

    let mut by_risk: BTreeMap<RiskTier, usize> = [RiskTier::Low, RiskTier::Medium, RiskTier::High]
        .into_iter()
        .map(|tier| (tier, 0))
        .collect();
    let mut self_plagiarism = 0;
    let mut originality_sum = 0u64;
    for summary in &summaries {
        *by_risk.entry(summary.risk).or_default() += 1;
        if summary.self_plagiarism {
            self_plagiarism += 1;
        }
        originality_sum += 100 - u64::from(summary.similarity.min(100));
    }

    let originality_rate = if summaries.is_empty() {
        None
    } else {
        Some(originality_sum as f64 / summaries.len() as f64)
    };

    Ok(StatsResponse {
        corpus,
        reports: ReportStats {
            total: summaries.len(),
            by_risk,
            self_plagiarism,
            originality_rate,
            last_analyzed_at: summaries.iter().map(|s| s.analyzed_at).max(),
        },
    })
}

/// Run the stats command: open the corpus and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let engine = open_engine(config, ProgressMode::Off.reporter()).await?;
    let stats = collect_stats(&engine).await?;
    engine.close().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("simcheck corpus stats");
    println!("=====================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Documents:     {}", stats.corpus.documents);
    for (origin, count) in &stats.corpus.by_origin {
        println!("    {:<12} {:>6}", origin.as_str(), count);
    }
    println!("  Fingerprints:  {}", stats.corpus.distinct_fingerprints);
    println!("  Postings:      {}", stats.corpus.postings);
    println!(
        "  Shingles:      k = {}, winnow window = {}",
        stats.corpus.k, stats.corpus.winnow_window
    );
    println!();

    let reports = &stats.reports;
    println!("  Reports:       {}", reports.total);
    if reports.total > 0 {
        for (tier, count) in &reports.by_risk {
            println!("    {:<12} {:>6}", tier.as_str(), count);
        }
        println!("  Self-plagiarism flags: {}", reports.self_plagiarism);
        if let Some(rate) = reports.originality_rate {
            println!("  Originality rate:      {:.1}%", rate);
        }
        if let Some(ts) = reports.last_analyzed_at {
            println!("  Last analysis:         {}", format_ts_iso(ts));
        }
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

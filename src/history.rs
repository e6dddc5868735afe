//! Report history listing.
//!
//! `simcheck history` and `GET /reports` list persisted runs newest first,
//! optionally narrowed to one risk tier or a title/author search.

use anyhow::Result;

use simcheck_core::{CorpusStore, HistoryFilter, ReportSummary};

use crate::config::Config;
use crate::get::format_ts_iso;
use crate::sqlite_store::SqliteStore;

/// Load the runs selected by `filter`, newest first.
///
/// Without a risk or search filter the limit is pushed down to the store.
pub async fn list_history(
    store: &dyn CorpusStore,
    filter: &HistoryFilter,
) -> Result<Vec<ReportSummary>> {
    if filter.is_unfiltered() {
        return Ok(store.list_reports(filter.limit).await?);
    }
    let all = store.list_reports(None).await?;
    Ok(filter.apply(all))
}

/// CLI entry point: print the selected runs as a table or JSON.
pub async fn run_history(config: &Config, filter: &HistoryFilter, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let rows = list_history(&store, filter).await;
    store.close().await?;
    let rows = rows?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No analyses found.");
        return Ok(());
    }

    println!(
        "{:<20}  {:>4}  {:<6}  {:<16}  {:<28}  run",
        "analyzed_at", "sim", "risk", "author", "document"
    );
    for row in &rows {
        let name = row.title.as_deref().unwrap_or(&row.document_id);
        println!(
            "{:<20}  {:>3}%  {:<6}  {:<16}  {:<28}  {}{}",
            format_ts_iso(row.analyzed_at),
            row.similarity,
            row.risk.as_str(),
            truncate(&row.author_id, 16),
            truncate(name, 28),
            row.run_id,
            if row.self_plagiarism { "  [self]" } else { "" }
        );
    }
    println!();
    println!("{} run(s)", rows.len());

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcheck_core::store::memory::InMemoryStore;
    use simcheck_core::store::ReportRecord;
    use simcheck_core::{AnalysisReport, RiskTier};

    fn record(run_id: &str, at: i64, similarity: u8, risk: RiskTier) -> ReportRecord {
        ReportRecord {
            run_id: run_id.to_string(),
            document_id: format!("doc-{}", run_id),
            author_id: "s-1".to_string(),
            title: Some(format!("Essay {}", run_id)),
            analyzed_at: at,
            report: AnalysisReport {
                document_id: format!("doc-{}", run_id),
                corpus_version: 0,
                query_tokens: 10,
                matched_tokens: 0,
                coverage: 0.0,
                similarity,
                risk,
                self_plagiarism: false,
                match_count: 0,
                sources: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn history_filters_by_risk_and_limits() {
        let store = InMemoryStore::new();
        store.save_report(&record("r1", 100, 10, RiskTier::Low)).await.unwrap();
        store.save_report(&record("r2", 200, 50, RiskTier::High)).await.unwrap();
        store.save_report(&record("r3", 300, 40, RiskTier::High)).await.unwrap();

        let latest = list_history(
            &store,
            &HistoryFilter {
                limit: Some(2),
                ..HistoryFilter::default()
            },
        )
        .await
        .unwrap();
        let ids: Vec<&str> = latest.iter().map(|s| s.run_id.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r2"]);

        let high = list_history(
            &store,
            &HistoryFilter {
                risk: Some(RiskTier::High),
                ..HistoryFilter::default()
            },
        )
        .await
        .unwrap();
        assert!(high.iter().all(|s| s.risk == RiskTier::High));
        assert_eq!(high.len(), 2);

        let searched = list_history(
            &store,
            &HistoryFilter {
                search: Some("essay r1".to_string()),
                ..HistoryFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].run_id, "r1");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("short", 16), "short");
        assert_eq!(truncate("Análise Económica", 8), "Análise…");
    }
}

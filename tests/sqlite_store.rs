//! SQLite store round trips.

use simcheck::config::Config;
use simcheck::sqlite_store::SqliteStore;
use simcheck_core::models::content_hash;
use simcheck_core::store::ReportRecord;
use simcheck_core::{AnalysisReport, CorpusStore, OriginTag, RiskTier, StoredDocument};
use tempfile::TempDir;

fn doc(id: &str, body: &str, origin: OriginTag) -> StoredDocument {
    StoredDocument {
        id: id.to_string(),
        author_id: "a-1".to_string(),
        origin,
        title: Some(format!("{} title", id)),
        url: None,
        body: body.to_string(),
        ingested_at: 1_700_000_000,
        content_hash: content_hash(body),
    }
}

fn record(run_id: &str, analyzed_at: i64, similarity: u8, risk: RiskTier) -> ReportRecord {
    ReportRecord {
        run_id: run_id.to_string(),
        document_id: "essay".to_string(),
        author_id: "s-1".to_string(),
        title: Some("Essay".to_string()),
        analyzed_at,
        report: AnalysisReport {
            document_id: "essay".to_string(),
            corpus_version: 3,
            query_tokens: 40,
            matched_tokens: 10,
            coverage: 0.25,
            similarity,
            risk,
            self_plagiarism: false,
            match_count: 2,
            sources: Vec::new(),
        },
    }
}

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let config = Config::with_db_path(tmp.path().join("data/simcheck.sqlite"));
    SqliteStore::open(&config).await.unwrap()
}

#[tokio::test]
async fn documents_upsert_list_and_delete() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert!(!store.put_document(&doc("b", "beta body", OriginTag::External)).await.unwrap());
    assert!(!store.put_document(&doc("a", "alpha body", OriginTag::Academic)).await.unwrap());
    assert!(store.put_document(&doc("b", "beta body v2", OriginTag::External)).await.unwrap());

    let all = store.list_documents().await.unwrap();
    let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let b = store.get_document("b").await.unwrap().unwrap();
    assert_eq!(b, doc("b", "beta body v2", OriginTag::External));

    assert!(store.delete_document("a").await.unwrap());
    assert!(!store.delete_document("a").await.unwrap());
    assert!(store.get_document("a").await.unwrap().is_none());

    store.close().await.unwrap();
}

#[tokio::test]
async fn reports_round_trip_newest_first() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.save_report(&record("r-old", 100, 10, RiskTier::Low)).await.unwrap();
    store.save_report(&record("r-new", 200, 45, RiskTier::High)).await.unwrap();

    let fetched = store.get_report("r-new").await.unwrap().unwrap();
    assert_eq!(fetched, record("r-new", 200, 45, RiskTier::High));
    assert!(store.get_report("missing").await.unwrap().is_none());

    let history = store.list_reports(None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].run_id, "r-new");
    assert_eq!(history[0].risk, RiskTier::High);
    assert_eq!(history[0].similarity, 45);
    assert_eq!(history[1], record("r-old", 100, 10, RiskTier::Low).summary());

    let latest = store.list_reports(Some(1)).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].run_id, "r-new");
}

#[tokio::test]
async fn meta_and_persistence_across_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(&tmp).await;
        assert!(store.get_meta("shingle_k").await.unwrap().is_none());
        store.set_meta("shingle_k", "5").await.unwrap();
        store.set_meta("shingle_k", "7").await.unwrap();
        store.put_document(&doc("a", "alpha body", OriginTag::Internal)).await.unwrap();
        store.close().await.unwrap();
    }

    let store = open_store(&tmp).await;
    assert_eq!(store.get_meta("shingle_k").await.unwrap().as_deref(), Some("7"));
    assert_eq!(store.list_documents().await.unwrap().len(), 1);
}

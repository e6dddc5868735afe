//! HTTP API tests against a live server on a free port.

use serde_json::{json, Value};
use simcheck::config::Config;
use simcheck::migrate;
use simcheck::server::run_server;
use tempfile::TempDir;

const SOURCE: &str = "The hippocampus consolidates short term memories into long term storage \
during deep sleep while the prefrontal cortex coordinates retrieval of those memories when \
they are needed for planning and decision making in daily life.";

const ESSAY: &str = "In my own words I argue that the hippocampus consolidates short term \
memories into long term storage during deep sleep and this matters for students who cram \
before examinations every semester at our university.";

fn test_config_with_port(tmp: &TempDir, port: u16) -> Config {
    let db_path = tmp.path().join("simcheck.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:{}"
"#,
        db_path.display(),
        port
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start_server() -> (TempDir, String) {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = test_config_with_port(&tmp, port);
    migrate::run_migrations(&cfg).await.unwrap();

    tokio::spawn(async move {
        run_server(&cfg).await.ok();
    });
    wait_for_server(port).await;

    (tmp, format!("http://127.0.0.1:{}", port))
}

#[tokio::test]
async fn test_health_reports_version() {
    let (_tmp, base) = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_ingest_analyze_and_fetch_report() {
    let (_tmp, base) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/corpus/memory", base))
        .json(&json!({
            "raw_text": SOURCE,
            "author_id": "press",
            "origin": "academic",
            "title": "Sleep and memory",
            "url": "https://journal.example/sleep"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["document_id"], "memory");
    assert_eq!(outcome["replaced"], false);

    let resp = client
        .post(format!("{}/analyze", base))
        .json(&json!({
            "document_id": "essay-7",
            "raw_text": ESSAY,
            "author_id": "s-1042"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let record: Value = resp.json().await.unwrap();
    let report = &record["report"];
    assert_eq!(report["similarity"], 38);
    assert_eq!(report["risk"], "high");
    assert_eq!(report["sources"][0]["id"], "memory");
    assert_eq!(report["sources"][0]["title"], "Sleep and memory");
    assert_eq!(report["sources"][0]["url"], "https://journal.example/sleep");

    let run_id = record["run_id"].as_str().unwrap();
    let resp = client
        .get(format!("{}/reports/{}", base, run_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let stored: Value = resp.json().await.unwrap();
    assert_eq!(stored, record);

    let stats: Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["corpus"]["documents"], 1);
    assert_eq!(stats["reports"]["total"], 1);
    assert_eq!(stats["reports"]["by_risk"]["high"], 1);
}

#[tokio::test]
async fn test_error_envelope() {
    let (_tmp, base) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/analyze", base))
        .json(&json!({
            "document_id": "blank",
            "raw_text": " ... ",
            "author_id": "s-1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no tokens"));

    let resp = client
        .delete(format!("{}/corpus/never-added", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .get(format!("{}/reports/no-such-run", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_report_history_filters() {
    let (_tmp, base) = start_server().await;
    let client = reqwest::Client::new();

    client
        .put(format!("{}/corpus/memory", base))
        .json(&json!({ "raw_text": SOURCE, "author_id": "press", "origin": "academic" }))
        .send()
        .await
        .unwrap();

    let high: Value = client
        .post(format!("{}/analyze", base))
        .json(&json!({
            "document_id": "essay-7",
            "raw_text": ESSAY,
            "author_id": "s-1042",
            "title": "Sleep and exams"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let low: Value = client
        .post(format!("{}/analyze", base))
        .json(&json!({
            "document_id": "essay-8",
            "raw_text": ESSAY,
            "author_id": "s-2001",
            "corpus_scope": ["internal", "external"]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(low["report"]["risk"], "low");

    let all: Value = client
        .get(format!("{}/reports", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let resp = client
        .get(format!("{}/reports?risk=high", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let rows: Value = resp.json().await.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["run_id"], high["run_id"]);
    assert_eq!(rows[0]["title"], "Sleep and exams");
    assert_eq!(rows[0]["similarity"], 38);

    let rows: Value = client
        .get(format!("{}/reports?search=sleep&limit=5", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let rows: Value = client
        .get(format!("{}/reports?limit=1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_removes_source() {
    let (_tmp, base) = start_server().await;
    let client = reqwest::Client::new();

    client
        .put(format!("{}/corpus/memory", base))
        .json(&json!({ "raw_text": SOURCE, "author_id": "press", "origin": "academic" }))
        .send()
        .await
        .unwrap();

    let resp = client
        .delete(format!("{}/corpus/memory", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["removed"], "memory");

    let record: Value = client
        .post(format!("{}/analyze", base))
        .json(&json!({ "document_id": "essay-7", "raw_text": ESSAY, "author_id": "s-1042" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["report"]["similarity"], 0);
}

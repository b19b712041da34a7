use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use kwsearch_core::config::Settings;
use kwsearch_core::stream::concat_chunks;
use kwsearch_core::traits::IndexBuilder;
use kwsearch_core::types::{ResponseChunk, SearchRequest};
use kwsearch_server::{routes, SearchService};
use kwsearch_text::CroissantIndexer;
use tempfile::TempDir;

/// Delegates to [`CroissantIndexer`] unless told to fail.
#[derive(Default)]
struct FlakyBuilder {
    fail: AtomicBool,
}

impl IndexBuilder for FlakyBuilder {
    fn build(&self, index_dir: &Path, data_dir: &Path) -> anyhow::Result<usize> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("builder unavailable");
        }
        CroissantIndexer.build(index_dir, data_dir)
    }
}

fn write_dataset(dir: &Path, file: &str, id: i64, name: &str, description: &str) {
    let json = serde_json::json!({ "jsonld": { "id": id, "name": name, "description": description } });
    std::fs::write(dir.join(file), json.to_string()).expect("write croissant");
}

fn settings(tmp: &TempDir, chunk_size: usize) -> Settings {
    let croissant = tmp.path().join("datasets").join("croissant");
    std::fs::create_dir_all(&croissant).expect("mkdir");
    write_dataset(&croissant, "a.json", 10, "Machine learning benchmarks", "Tabular machine learning tasks");
    write_dataset(&croissant, "b.json", 20, "Learning analytics", "Student machine logs");
    write_dataset(&croissant, "c.json", 30, "Weather stations", "Hourly readings");
    Settings {
        data_dir: tmp.path().to_path_buf(),
        collection_name: "datasets".to_string(),
        croissant_dir: "croissant".to_string(),
        index_dir: "lucene".to_string(),
        port: 0,
        max_results: 100,
        min_score: 0.0,
        chunk_size,
    }
}

fn start(tmp: &TempDir, chunk_size: usize) -> SearchService {
    SearchService::start(settings(tmp, chunk_size), Arc::new(CroissantIndexer)).expect("start")
}

#[test]
fn start_builds_missing_index() {
    let tmp = TempDir::new().expect("tempdir");
    let service = start(&tmp, 1024);
    assert!(service.is_ready());
    assert!(service.settings().index_path().join("meta.json").is_file());
    let result = service.evaluate(&SearchRequest::new("machine learning"));
    assert_eq!(result.doc_ids, vec![10, 20]);
}

#[test]
fn start_fails_without_croissant_data() {
    let tmp = TempDir::new().expect("tempdir");
    let mut settings = settings(&tmp, 1024);
    settings.croissant_dir = "missing".to_string();
    assert!(SearchService::start(settings, Arc::new(CroissantIndexer)).is_err());
}

#[test]
fn stream_reassembles_the_unary_result() {
    let tmp = TempDir::new().expect("tempdir");
    let service = start(&tmp, 2);
    let request = SearchRequest::new("machine OR weather").with_highlighting(true);
    let unary = service.evaluate(&request);
    assert_eq!(unary.len(), 3);

    let chunks: Vec<ResponseChunk> = service.evaluate_stream(&request).collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks.iter().filter(|c| c.is_last_chunk).count(), 1);
    assert!(chunks[1].is_last_chunk);
    let rebuilt = concat_chunks(chunks);
    assert_eq!(rebuilt.doc_ids, unary.doc_ids);
    assert_eq!(rebuilt.scores, unary.scores);
    assert_eq!(rebuilt.highlights, unary.highlights);
}

#[test]
fn single_hit_chunks() {
    let tmp = TempDir::new().expect("tempdir");
    let service = start(&tmp, 1);
    let chunks: Vec<ResponseChunk> = service.evaluate_stream(&SearchRequest::new("machine learning")).collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].doc_ids, vec![10]);
    assert!(!chunks[0].is_last_chunk);
    assert_eq!(chunks[1].doc_ids, vec![20]);
    assert!(chunks[1].is_last_chunk);
}

#[test]
fn no_hits_stream_nothing() {
    let tmp = TempDir::new().expect("tempdir");
    let service = start(&tmp, 4);
    assert_eq!(service.evaluate_stream(&SearchRequest::new("astronomy")).count(), 0);
    assert_eq!(service.evaluate_stream(&SearchRequest::new("(broken")).count(), 0);
}

#[test]
fn recreate_index_picks_up_new_data() {
    let tmp = TempDir::new().expect("tempdir");
    let service = start(&tmp, 1024);
    assert!(service.evaluate(&SearchRequest::new("astronomy")).is_empty());

    write_dataset(&service.settings().croissant_path(), "d.json", 40, "Astronomy catalog", "Star positions");
    let response = service.recreate_index();
    assert!(response.success, "{}", response.message);
    assert_eq!(service.evaluate(&SearchRequest::new("astronomy")).doc_ids, vec![40]);
}

#[test]
fn failed_rebuild_keeps_serving_empty_results() {
    let tmp = TempDir::new().expect("tempdir");
    let builder = Arc::new(FlakyBuilder::default());
    let service = SearchService::start(settings(&tmp, 1024), builder.clone()).expect("start");

    builder.fail.store(true, Ordering::SeqCst);
    let response = service.recreate_index();
    assert!(!response.success);
    assert!(response.message.contains("builder unavailable"));
    assert!(!service.is_ready());
    assert!(service.evaluate(&SearchRequest::new("machine")).is_empty());

    builder.fail.store(false, Ordering::SeqCst);
    assert!(service.recreate_index().success);
    assert_eq!(service.evaluate(&SearchRequest::new("weather")).doc_ids, vec![30]);
}

#[tokio::test]
async fn evaluate_handler_answers_json() {
    let tmp = TempDir::new().expect("tempdir");
    let service = Arc::new(start(&tmp, 1024));
    let request: SearchRequest =
        serde_json::from_str(r#"{"query": "machine learning", "docIds": [20], "enableHighlighting": true}"#).expect("request");
    let Json(result) = routes::evaluate(State(service), Json(request)).await.expect("evaluate");
    assert_eq!(result.doc_ids, vec![20]);
    assert!(result.highlights[&20].contains_key("name"));
}

#[tokio::test]
async fn stream_handler_writes_one_chunk_per_line() {
    let tmp = TempDir::new().expect("tempdir");
    let service = Arc::new(start(&tmp, 1));
    let response = routes::evaluate_stream(State(service), Json(SearchRequest::new("machine")))
        .await
        .expect("evaluate_stream");
    assert_eq!(response.headers()["content-type"], routes::NDJSON);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let text = String::from_utf8(body.to_vec()).expect("utf8");
    let chunks: Vec<ResponseChunk> = text.lines().map(|l| serde_json::from_str(l).expect("chunk")).collect();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[1].is_last_chunk);
    assert!(text.contains("\"isLastChunk\":false"));
}

#[tokio::test]
async fn recreate_and_health_handlers() {
    let tmp = TempDir::new().expect("tempdir");
    let service = Arc::new(start(&tmp, 1024));
    let Json(response) = routes::recreate_index(State(service.clone())).await.expect("recreate");
    assert!(response.success);
    let Json(health) = routes::health(State(service)).await;
    assert!(health.index_loaded);
}

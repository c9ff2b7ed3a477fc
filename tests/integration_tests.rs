//! Integration tests for the ingestion pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use telemetry_ingest::pipeline::{MonitorConfig, ProbeSchedule};
use telemetry_ingest::{
    create_router, AppState, EventFilter, EventStore, FlushConfig, IngestError, IngestPipeline,
    MemoryStore, NewEvent, Payload, PipelineConfig, SqliteStore, TenantAuth,
};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_tenant() -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("tenant_{}_{}", std::process::id(), id)
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        flush: FlushConfig {
            batch_size: 100,
            idle_interval: Duration::from_millis(10),
        },
        monitor: MonitorConfig {
            schedule: ProbeSchedule::Fixed {
                interval: Duration::from_millis(10),
            },
            probe_timeout: Duration::from_millis(500),
        },
        ..PipelineConfig::default()
    }
}

fn events(n: usize, function: &str) -> Vec<NewEvent> {
    (0..n)
        .map(|i| {
            let mut payload = Payload::new();
            payload.insert("seq".to_string(), json!(i));
            NewEvent::new(format!("event_{}", i), payload)
                .with_function(function)
                .with_status("success")
        })
        .collect()
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_ready_storage_persists_and_queries() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("events.db")));
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    assert!(pipeline.bootstrap().await);
    let handle = pipeline.spawn();

    let tenant = unique_tenant();
    let ack = pipeline.gateway().ingest(&tenant, events(2, "f")).unwrap();
    assert_eq!(ack.queued, 2);
    assert_eq!(ack.db, "connected");

    assert!(wait_until(Duration::from_secs(2), || pipeline.flusher().stats().events_committed == 2).await);

    let page = store.query(&tenant, &EventFilter::new()).await.unwrap();
    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|e| e.tenant_id == tenant));

    assert_eq!(handle.shutdown().await, 0);
}

#[tokio::test]
async fn test_unready_storage_keeps_events_buffered() {
    let store = Arc::new(MemoryStore::new());
    store.set_available(false);
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    assert!(!pipeline.bootstrap().await);
    assert_eq!(pipeline.monitor().consecutive_failures(), 1);
    let handle = pipeline.spawn();

    let ack = pipeline.gateway().ingest("t1", events(1, "f")).unwrap();
    assert_eq!(ack.db, "disconnected");

    // Several flush and probe cycles
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.row_count(), 0);
    assert_eq!(pipeline.buffer().len(), 1);
    assert!(pipeline.flusher().stats().events_deferred >= 1);
    assert_eq!(pipeline.flusher().stats().batches_committed, 0);

    assert_eq!(handle.shutdown().await, 1);
}

#[tokio::test]
async fn test_oversized_request_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    pipeline.bootstrap().await;
    let handle = pipeline.spawn();

    let err = pipeline.gateway().ingest("t1", events(101, "f")).unwrap_err();
    assert_eq!(err, IngestError::TooManyEvents { count: 101, max: 100 });

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(pipeline.buffer().enqueued_total(), 0);
    assert_eq!(store.row_count(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_commit_is_retried_without_duplicates() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next_commits(1);
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    pipeline.bootstrap().await;
    let handle = pipeline.spawn();

    pipeline.gateway().ingest("t1", events(5, "f")).unwrap();
    assert!(wait_until(Duration::from_secs(2), || store.row_count() == 5).await);

    // Give the worker a few more cycles to prove nothing is written twice
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut types: Vec<String> = store.rows().into_iter().map(|e| e.event_type).collect();
    types.sort();
    assert_eq!(types, vec!["event_0", "event_1", "event_2", "event_3", "event_4"]);

    let stats = pipeline.flusher().stats();
    assert_eq!(stats.batches_requeued, 1);
    assert_eq!(stats.events_committed, 5);
    assert_eq!(pipeline.buffer().requeued_total(), 5);
    // Constraint failures do not count as lost connectivity
    assert!(pipeline.readiness().is_ready());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_session_gate_bounds_flushes_and_reads() {
    let store = Arc::new(MemoryStore::new());
    store.set_latency(Duration::from_millis(15));
    let config = PipelineConfig {
        max_sessions: 3,
        flush: FlushConfig {
            batch_size: 2,
            idle_interval: Duration::from_millis(1),
        },
        ..fast_config()
    };
    let pipeline = IngestPipeline::new(store.clone(), config);
    pipeline.bootstrap().await;
    let handle = pipeline.spawn();

    pipeline.gateway().ingest("t1", events(20, "f")).unwrap();

    let state = Arc::new(AppState::new(&pipeline, TenantAuth::new(None, None)));
    let readers: Vec<_> = (0..12)
        .map(|_| {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let _permit = state.session().await.unwrap();
                state.store.query("t1", &EventFilter::new()).await.unwrap()
            })
        })
        .collect();
    for reader in readers {
        reader.await.unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || store.row_count() == 20).await);
    assert!(store.peak_sessions() <= 3, "peak {}", store.peak_sessions());
    assert!(pipeline.gate().peak() <= 3);
    assert!(pipeline.gate().peak() >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_storage_appearing_after_startup() {
    let dir = TempDir::new().unwrap();
    let db_dir = dir.path().join("later");
    let store = Arc::new(SqliteStore::new(db_dir.join("events.db")));
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    assert!(!pipeline.bootstrap().await);
    let handle = pipeline.spawn();

    pipeline.gateway().ingest("t1", events(3, "f")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.buffer().len(), 3);

    std::fs::create_dir_all(&db_dir).unwrap();
    assert!(wait_until(Duration::from_secs(2), || pipeline.flusher().stats().events_committed == 3).await);
    assert!(pipeline.readiness().is_ready());
    assert_eq!(pipeline.monitor().consecutive_failures(), 0);
    assert!(pipeline.buffer().is_empty());

    let page = store.query("t1", &EventFilter::new()).await.unwrap();
    assert_eq!(page.total, 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_both_tasks_and_closes_gate() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    pipeline.bootstrap().await;
    let handle = pipeline.spawn();
    let token = handle.cancellation_token();

    let started = tokio::time::Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(token.is_cancelled());
    assert!(pipeline.gate().is_closed());

    let pings = store.ping_count();
    pipeline.gateway().ingest("t1", events(1, "f")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.ping_count(), pings);
    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn test_http_end_to_end() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("events.db")));
    let pipeline = IngestPipeline::new(store.clone(), fast_config());
    pipeline.bootstrap().await;
    let handle = pipeline.spawn();

    let auth = TenantAuth::new(Some("demo-key".to_string()), Some("demo-tenant".to_string()));
    let app = create_router(Arc::new(AppState::new(&pipeline, auth)));

    let request = |method: &str, uri: &str, body: Value| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("X-API-Key", "demo-key")
            .header("X-Tenant-ID", "demo-tenant")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let batch = json!([
        {"event_type": "llm_call", "payload": {"model": "m1"}, "function_name": "answer", "status": "success", "latency_ms": 120},
        {"event_type": "llm_call", "payload": {"model": "m1"}, "function_name": "answer", "status": "error"},
        {"event_type": "tool_call", "payload": {}, "function_name": "search", "status": "success"}
    ]);
    let response = app
        .clone()
        .oneshot(request("POST", "/v1/ingest", batch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(wait_until(Duration::from_secs(2), || pipeline.flusher().stats().events_committed == 3).await);

    let response = app
        .clone()
        .oneshot(request("POST", "/v1/query", json!({"function_name": "answer", "limit": 10})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(request("GET", "/v1/stats/errors", Value::Null))
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["total_events"], 3);
    assert_eq!(body["error_events"], 1);
    assert_eq!(body["error_rate"], 0.3333);

    let response = app
        .oneshot(request("GET", "/v1/stats/top-functions", Value::Null))
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!([
            {"function_name": "answer", "count": 2},
            {"function_name": "search", "count": 1}
        ])
    );

    handle.shutdown().await;
}

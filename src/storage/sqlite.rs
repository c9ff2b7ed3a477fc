//! SQLite-backed event store
//!
//! Every session opens its own connection on a blocking thread, so the
//! number of concurrent connections equals the number of concurrent sessions
//! admitted by the session gate. Each new connection ensures the schema
//! before use, so a database that was unreachable at startup, or whose file
//! was replaced while running, becomes usable again without a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use super::EventStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{
    ErrorStats, EventFilter, EventPage, ExecutionEvent, FunctionCount, Payload, PendingEvent,
};
use crate::utils::{from_micros, to_micros};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS execution_events (
        id            TEXT PRIMARY KEY,
        tenant_id     TEXT NOT NULL CHECK (length(tenant_id) > 0),
        timestamp_us  INTEGER NOT NULL,
        event_type    TEXT NOT NULL,
        payload       TEXT NOT NULL,
        function_name TEXT,
        latency_ms    INTEGER,
        status        TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_execution_events_tenant_ts
        ON execution_events (tenant_id, timestamp_us);
";

const SELECT_COLUMNS: &str =
    "id, tenant_id, timestamp_us, event_type, payload, function_name, latency_ms, status";

/// SQLite event store
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Create a store for the database file at `path`
    ///
    /// Nothing is opened until the first session.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Set how long a session waits on a locked database before failing
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against a fresh connection on the blocking pool
    async fn with_session<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;

        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path, busy_timeout)?;
            conn.execute_batch(SCHEMA)?;
            f(&mut conn)
        })
        .await?
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Build the WHERE clause and bind values shared by the page and count queries
fn filter_clause(tenant_id: &str, filter: &EventFilter) -> (String, Vec<SqlValue>) {
    let mut clause = String::from("WHERE tenant_id = ?");
    let mut values = vec![SqlValue::Text(tenant_id.to_string())];

    if let Some(start) = filter.start_time {
        clause.push_str(" AND timestamp_us >= ?");
        values.push(SqlValue::Integer(to_micros(&start)));
    }
    if let Some(end) = filter.end_time {
        clause.push_str(" AND timestamp_us <= ?");
        values.push(SqlValue::Integer(to_micros(&end)));
    }
    if let Some(ref name) = filter.function_name {
        clause.push_str(" AND function_name = ?");
        values.push(SqlValue::Text(name.clone()));
    }
    if let Some(ref status) = filter.status {
        clause.push_str(" AND status = ?");
        values.push(SqlValue::Text(status.clone()));
    }

    (clause, values)
}

/// Raw column values for one row, decoded after the statement finishes
struct RawEvent {
    id: String,
    tenant_id: String,
    timestamp_us: i64,
    event_type: String,
    payload: String,
    function_name: Option<String>,
    latency_ms: Option<i64>,
    status: Option<String>,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            timestamp_us: row.get(2)?,
            event_type: row.get(3)?,
            payload: row.get(4)?,
            function_name: row.get(5)?,
            latency_ms: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn decode(self) -> StorageResult<ExecutionEvent> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StorageError::Query(format!("bad event id {}: {}", self.id, e)))?;
        let payload: Payload = serde_json::from_str(&self.payload)?;

        Ok(ExecutionEvent {
            id,
            tenant_id: self.tenant_id,
            timestamp: from_micros(self.timestamp_us),
            event_type: self.event_type,
            payload,
            function_name: self.function_name,
            latency_ms: self.latency_ms,
            status: self.status,
        })
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.with_session(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.with_session(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn insert_batch(&self, events: &[PendingEvent]) -> StorageResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let events = events.to_vec();
        self.with_session(move |conn| {
            // Dropping an uncommitted transaction rolls it back
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO execution_events
                        (id, tenant_id, timestamp_us, event_type, payload,
                         function_name, latency_ms, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;

                for event in &events {
                    let payload = serde_json::to_string(&event.payload)?;
                    stmt.execute(params![
                        Uuid::new_v4().to_string(),
                        event.tenant_id,
                        to_micros(&event.timestamp),
                        event.event_type,
                        payload,
                        event.function_name,
                        event.latency_ms,
                        event.status,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(events.len())
        })
        .await
    }

    async fn query(&self, tenant_id: &str, filter: &EventFilter) -> StorageResult<EventPage> {
        let (clause, mut values) = filter_clause(tenant_id, filter);
        let limit = filter.normalized_limit() as i64;
        let offset = filter.offset as i64;

        self.with_session(move |conn| {
            let count_sql = format!("SELECT COUNT(*) FROM execution_events {}", clause);
            let total: i64 =
                conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;

            let page_sql = format!(
                "SELECT {} FROM execution_events {} \
                 ORDER BY timestamp_us DESC, rowid DESC LIMIT ? OFFSET ?",
                SELECT_COLUMNS, clause
            );
            values.push(SqlValue::Integer(limit));
            values.push(SqlValue::Integer(offset));

            let mut stmt = conn.prepare(&page_sql)?;
            let raw = stmt
                .query_map(params_from_iter(values.iter()), RawEvent::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let items = raw
                .into_iter()
                .map(RawEvent::decode)
                .collect::<StorageResult<Vec<_>>>()?;

            Ok(EventPage {
                items,
                total: total as usize,
            })
        })
        .await
    }

    async fn error_stats(&self, tenant_id: &str) -> StorageResult<ErrorStats> {
        let tenant_id = tenant_id.to_string();
        self.with_session(move |conn| {
            let (total, errors): (i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0)
                 FROM execution_events WHERE tenant_id = ?1",
                params![tenant_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(ErrorStats::from_counts(total as u64, errors as u64))
        })
        .await
    }

    async fn top_functions(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<FunctionCount>> {
        let tenant_id = tenant_id.to_string();
        self.with_session(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT function_name, COUNT(*) AS count
                 FROM execution_events
                 WHERE tenant_id = ?1 AND function_name IS NOT NULL
                 GROUP BY function_name
                 ORDER BY count DESC, function_name ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![tenant_id, limit as i64], |row| {
                    Ok(FunctionCount {
                        function_name: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewEvent;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("events.db"));
        (dir, store)
    }

    fn event(tenant: &str, hour: u32, function: &str, status: &str) -> PendingEvent {
        NewEvent::new("llm_call", json!({"n": hour}).as_object().cloned().unwrap())
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap())
            .with_function(function)
            .with_status(status)
            .with_latency(150)
            .stamp(tenant, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_and_query_roundtrip() {
        let (_dir, store) = create_test_store();
        store.init_schema().await.unwrap();

        let inserted = store
            .insert_batch(&[event("t1", 1, "generate", "success")])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let page = store.query("t1", &EventFilter::new()).await.unwrap();
        assert_eq!(page.total, 1);
        let stored = &page.items[0];
        assert_eq!(stored.tenant_id, "t1");
        assert_eq!(stored.function_name.as_deref(), Some("generate"));
        assert_eq!(stored.latency_ms, Some(150));
        assert_eq!(stored.payload.get("n"), Some(&json!(1)));
        assert_eq!(
            stored.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_query_is_tenant_scoped_and_newest_first() {
        let (_dir, store) = create_test_store();
        store
            .insert_batch(&[
                event("t1", 1, "a", "success"),
                event("t1", 3, "a", "success"),
                event("t1", 2, "a", "success"),
                event("t2", 4, "a", "success"),
            ])
            .await
            .unwrap();

        let page = store.query("t1", &EventFilter::new()).await.unwrap();
        assert_eq!(page.total, 3);
        let hours: Vec<i64> = page
            .items
            .iter()
            .map(|e| e.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(hours, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_query_pagination_keeps_total() {
        let (_dir, store) = create_test_store();
        let batch: Vec<_> = (0..10).map(|h| event("t1", h, "a", "success")).collect();
        store.insert_batch(&batch).await.unwrap();

        let filter = EventFilter {
            limit: 3,
            offset: 3,
            ..EventFilter::new()
        };
        let page = store.query("t1", &filter).await.unwrap();
        assert_eq!(page.total, 10);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.items[0].payload["n"], json!(6));
    }

    #[tokio::test]
    async fn test_query_filters() {
        let (_dir, store) = create_test_store();
        store
            .insert_batch(&[
                event("t1", 1, "generate", "success"),
                event("t1", 2, "generate", "error"),
                event("t1", 3, "summarize", "error"),
                event("t1", 4, "generate", "error"),
            ])
            .await
            .unwrap();

        let filter = EventFilter {
            function_name: Some("generate".to_string()),
            status: Some("error".to_string()),
            end_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap()),
            ..EventFilter::new()
        };
        let page = store.query("t1", &filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].payload["n"], json!(2));
    }

    #[tokio::test]
    async fn test_constraint_violation_rolls_back_whole_batch() {
        let (_dir, store) = create_test_store();
        let mut bad = event("t1", 2, "a", "success");
        bad.tenant_id = String::new();

        let result = store
            .insert_batch(&[event("t1", 1, "a", "success"), bad])
            .await;
        assert!(matches!(result, Err(StorageError::Constraint(_))));

        let page = store.query("t1", &EventFilter::new()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_connectivity_error() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("missing").join("events.db"));

        let err = store.ping().await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_schema_created_once_storage_appears() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("late");
        let store = SqliteStore::new(sub.join("events.db"));

        assert!(store.init_schema().await.is_err());

        std::fs::create_dir_all(&sub).unwrap();
        store.ping().await.unwrap();
        store
            .insert_batch(&[event("t1", 1, "a", "success")])
            .await
            .unwrap();
        assert_eq!(store.query("t1", &EventFilter::new()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_schema_recreated_after_file_removed() {
        let (_dir, store) = create_test_store();
        let store = store.with_busy_timeout(Duration::from_millis(250));
        store
            .insert_batch(&[event("t1", 1, "a", "success")])
            .await
            .unwrap();

        std::fs::remove_file(store.path()).unwrap();

        store
            .insert_batch(&[event("t1", 2, "a", "success")])
            .await
            .unwrap();
        let page = store.query("t1", &EventFilter::new()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].payload["n"], json!(2));
    }

    #[tokio::test]
    async fn test_error_stats_and_top_functions() {
        let (_dir, store) = create_test_store();
        store
            .insert_batch(&[
                event("t1", 1, "generate", "success"),
                event("t1", 2, "generate", "error"),
                event("t1", 3, "summarize", "success"),
                event("t2", 4, "other", "error"),
            ])
            .await
            .unwrap();

        let stats = store.error_stats("t1").await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.error_events, 1);
        assert_eq!(stats.error_rate, 0.3333);

        let top = store.top_functions("t1", 10).await.unwrap();
        assert_eq!(
            top,
            vec![
                FunctionCount {
                    function_name: "generate".to_string(),
                    count: 2
                },
                FunctionCount {
                    function_name: "summarize".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_error_stats_empty_tenant() {
        let (_dir, store) = create_test_store();
        let stats = store.error_stats("nobody").await.unwrap();
        assert_eq!(stats, ErrorStats::from_counts(0, 0));
    }
}

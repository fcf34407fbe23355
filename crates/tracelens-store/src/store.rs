//! SQLite-backed span storage.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, Row};
use thiserror::Error;
use tracelens_core::{SpanRecord, TraceMetrics};
use tracing::debug;

/// Errors from span store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
}

const SPAN_COLUMNS: &str = "span_id, trace_id, parent_span_id, name, operation_kind, \
     start_time, end_time, duration_nanos, status_code, input_tokens, output_tokens, \
     total_tokens, input, output, raw";

const ROOT_FILTER: &str = "(parent_span_id IS NULL OR parent_span_id = '')";

/// SQLite-backed span storage.
pub struct TraceStore {
    conn: Mutex<Connection>,
}

impl TraceStore {
    /// Opens (or creates) the span database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Creates an in-memory span store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS spans (
                span_id TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                parent_span_id TEXT,
                name TEXT NOT NULL,
                operation_kind TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration_nanos INTEGER,
                status_code INTEGER NOT NULL,
                input_tokens INTEGER,
                output_tokens INTEGER,
                total_tokens INTEGER,
                input TEXT,
                output TEXT,
                raw TEXT NOT NULL,
                PRIMARY KEY (trace_id, span_id)
            );

            CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans(trace_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_spans_start ON spans(start_time DESC);
            "#,
        )?;

        Ok(())
    }

    /// Inserts or replaces a span record.
    pub fn insert_span(&self, span: &SpanRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        insert_span(&conn, span)
    }

    /// Inserts a batch of spans in one transaction.
    pub fn insert_spans(&self, spans: &[SpanRecord]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        for span in spans {
            insert_span(&tx, span)?;
        }
        tx.commit()?;
        debug!(count = spans.len(), "Inserted spans");
        Ok(spans.len())
    }

    /// Loads a JSON array of span records into the store, returning how many were written.
    pub fn seed_from_file(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let content = fs::read_to_string(path)?;
        let spans: Vec<SpanRecord> = serde_json::from_str(&content)?;
        debug!(count = spans.len(), "Seeding spans from file");
        self.insert_spans(&spans)
    }

    pub fn span_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let count = conn.query_row("SELECT COUNT(*) FROM spans", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Root spans whose name contains `query`, newest first.
    pub fn list_root_spans(
        &self,
        query: &str,
        offset: usize,
        size: usize,
    ) -> Result<Vec<SpanRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let sql = format!(
            "SELECT {SPAN_COLUMNS} FROM spans WHERE {ROOT_FILTER} AND name LIKE ?1 \
             ORDER BY start_time DESC, trace_id LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map(
            params![like_pattern(query), size as i64, offset as i64],
            row_to_span,
        )?;

        let mut spans = Vec::new();
        for row in rows {
            spans.push(row?);
        }

        Ok(spans)
    }

    /// Gets up to `limit` spans of a trace, in start-time order.
    pub fn get_spans(&self, trace_id: &str, limit: usize) -> Result<Vec<SpanRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let sql = format!(
            "SELECT {SPAN_COLUMNS} FROM spans WHERE trace_id = ?1 \
             ORDER BY start_time, rowid LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map(params![trace_id, limit as i64], row_to_span)?;

        let mut spans = Vec::new();
        for row in rows {
            spans.push(row?);
        }

        Ok(spans)
    }

    /// Deletes every span of a trace.
    pub fn delete_trace(&self, trace_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let deleted = conn.execute("DELETE FROM spans WHERE trace_id = ?1", params![trace_id])?;
        debug!(trace_id, deleted, "Deleted trace spans");
        Ok(deleted)
    }

    /// Counts, token sum and root latency percentiles over traces whose root name contains `query`.
    pub fn trace_metrics(&self, query: &str) -> Result<TraceMetrics, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let pattern = like_pattern(query);

        let sql = format!(
            r#"WITH matched AS (
                   SELECT DISTINCT trace_id FROM spans WHERE {ROOT_FILTER} AND name LIKE ?1
               )
               SELECT
               (SELECT COUNT(*) FROM matched),
               COUNT(*),
               COALESCE(SUM(CASE WHEN status_code >= 2 THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(COALESCE(total_tokens,
                   COALESCE(input_tokens, 0) + COALESCE(output_tokens, 0))), 0)
               FROM spans WHERE trace_id IN (SELECT trace_id FROM matched)"#
        );
        let mut metrics = conn.query_row(&sql, params![pattern], |row| {
            Ok(TraceMetrics {
                trace_count: row.get(0)?,
                span_count: row.get(1)?,
                error_count: row.get(2)?,
                total_tokens: row.get(3)?,
                ..Default::default()
            })
        })?;

        let sql = format!(
            "SELECT duration_nanos FROM spans WHERE {ROOT_FILTER} AND name LIKE ?1 \
             AND duration_nanos > 0 ORDER BY duration_nanos"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern], |row| row.get::<_, i64>(0))?;
        let mut durations_ms = Vec::new();
        for row in rows {
            durations_ms.push(row? as f64 / 1_000_000.0);
        }

        metrics.latency_p50_ms = nearest_rank(&durations_ms, 50.0);
        metrics.latency_p99_ms = nearest_rank(&durations_ms, 99.0);
        Ok(metrics)
    }
}

fn insert_span(conn: &Connection, span: &SpanRecord) -> Result<(), StoreError> {
    conn.execute(
        r#"INSERT OR REPLACE INTO spans
           (span_id, trace_id, parent_span_id, name, operation_kind, start_time, end_time,
            duration_nanos, status_code, input_tokens, output_tokens, total_tokens,
            input, output, raw)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
        params![
            span.span_id,
            span.trace_id,
            span.parent_span_id,
            span.name,
            span.operation_kind,
            span.start_time,
            span.end_time,
            span.duration_nanos,
            span.status_code,
            span.input_tokens,
            span.output_tokens,
            span.total_tokens,
            span.input,
            span.output,
            serde_json::to_string(&span.raw)?,
        ],
    )?;

    Ok(())
}

fn row_to_span(row: &Row<'_>) -> rusqlite::Result<SpanRecord> {
    let raw: String = row.get(14)?;
    Ok(SpanRecord {
        span_id: row.get(0)?,
        trace_id: row.get(1)?,
        parent_span_id: row.get(2)?,
        name: row.get(3)?,
        operation_kind: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        duration_nanos: row.get(7)?,
        status_code: row.get(8)?,
        input_tokens: row.get(9)?,
        output_tokens: row.get(10)?,
        total_tokens: row.get(11)?,
        input: row.get(12)?,
        output: row.get(13)?,
        raw: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
    })
}

fn like_pattern(query: &str) -> String {
    format!("%{}%", query.trim())
}

/// Nearest-rank percentile over ascending values; 0 when empty.
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn span(trace: &str, id: &str, parent: Option<&str>, start: &str) -> SpanRecord {
        let mut span = SpanRecord::new(id, trace)
            .with_name(format!("{trace}-{id}"))
            .with_times(start, start);
        span.parent_span_id = parent.map(str::to_string);
        span
    }

    fn seeded_store() -> TraceStore {
        let store = TraceStore::in_memory().unwrap();
        store
            .insert_spans(&[
                span("checkout", "root", None, "2025-01-01 00:00:00")
                    .with_duration_nanos(100_000_000)
                    .with_tokens(10, 5),
                span("checkout", "llm", Some("root"), "2025-01-01 00:00:00.100")
                    .with_status_code(2)
                    .with_tokens(3, 2),
                span("search", "root", Some(""), "2025-01-02 00:00:00")
                    .with_duration_nanos(300_000_000),
                span("search", "orphan", Some("gone"), "2025-01-02 00:00:01"),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_span_round_trip() {
        let store = TraceStore::in_memory().unwrap();
        let mut record = span("t1", "s1", Some("s0"), "2025-01-01 00:00:00.123456")
            .with_operation("chat")
            .with_tokens(4, 6);
        record.raw = json!({ "attributes": { "gen_ai.system": "openai" } });
        record.input = Some("hello".into());
        store.insert_span(&record).unwrap();

        let spans = store.get_spans("t1", 10).unwrap();
        assert_eq!(spans, vec![record]);
    }

    #[test]
    fn test_span_ids_are_scoped_to_trace() {
        let store = seeded_store();
        assert_eq!(store.span_count().unwrap(), 4);
        assert_eq!(store.get_spans("checkout", 10).unwrap().len(), 2);
        assert_eq!(store.get_spans("search", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_list_root_spans() {
        let store = seeded_store();

        let roots = store.list_root_spans("", 0, 10).unwrap();
        let ids: Vec<_> = roots.iter().map(|s| s.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["search", "checkout"]);

        let page = store.list_root_spans("", 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].trace_id, "checkout");

        let filtered = store.list_root_spans("check", 0, 10).unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_get_spans_orders_and_limits() {
        let store = seeded_store();
        let spans = store.get_spans("checkout", 1).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "root");
    }

    #[test]
    fn test_trace_metrics() {
        let store = seeded_store();

        let all = store.trace_metrics("").unwrap();
        assert_eq!(all.trace_count, 2);
        assert_eq!(all.span_count, 4);
        assert_eq!(all.error_count, 1);
        assert_eq!(all.total_tokens, 20);
        assert_eq!(all.latency_p50_ms, 100.0);
        assert_eq!(all.latency_p99_ms, 300.0);

        let checkout = store.trace_metrics("checkout").unwrap();
        assert_eq!(checkout.trace_count, 1);
        assert_eq!(checkout.span_count, 2);

        let none = store.trace_metrics("no-such-trace").unwrap();
        assert_eq!(none, TraceMetrics::default());
    }

    #[test]
    fn test_delete_trace() {
        let store = seeded_store();
        assert_eq!(store.delete_trace("checkout").unwrap(), 2);
        assert!(store.get_spans("checkout", 10).unwrap().is_empty());
        assert_eq!(store.span_count().unwrap(), 2);
    }

    #[test]
    fn test_seed_from_file() {
        let path = std::env::temp_dir().join(format!("tracelens-seed-{}.json", std::process::id()));
        let spans = vec![
            span("seeded", "root", None, "2025-01-03 00:00:00"),
            span("seeded", "child", Some("root"), "2025-01-03 00:00:01"),
        ];
        fs::write(&path, serde_json::to_string(&spans).unwrap()).unwrap();

        let store = TraceStore::in_memory().unwrap();
        let written = store.seed_from_file(&path);
        fs::remove_file(&path).ok();

        assert_eq!(written.unwrap(), 2);
        assert_eq!(store.get_spans("seeded", 10).unwrap(), spans);
        assert!(matches!(
            store.seed_from_file("/nonexistent/spans.json"),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_nearest_rank() {
        assert_eq!(nearest_rank(&[], 50.0), 0.0);
        assert_eq!(nearest_rank(&[5.0], 99.0), 5.0);
        assert_eq!(nearest_rank(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.0);
        assert_eq!(nearest_rank(&[1.0, 2.0, 3.0, 4.0], 99.0), 4.0);
    }
}

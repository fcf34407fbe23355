//! In-memory span source double shared by the cache tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracelens_core::{FetchError, SpanRecord, SpanSource, TraceMetrics};

pub(crate) fn sample_spans() -> Vec<SpanRecord> {
    vec![
        SpanRecord::new("root", "t1")
            .with_operation("invoke_agent")
            .with_times("2025-01-01 00:00:00", "2025-01-01 00:00:02"),
        SpanRecord::new("chat", "t1")
            .with_parent("root")
            .with_operation("chat")
            .with_times("2025-01-01 00:00:00.250", "2025-01-01 00:00:01"),
        SpanRecord::new("tool", "t1")
            .with_parent("root")
            .with_operation("execute_tool")
            .with_times("2025-01-01 00:00:01.100", "2025-01-01 00:00:01.900"),
        SpanRecord::new("other-root", "t2").with_times("2025-01-02 00:00:00", "2025-01-02 00:00:01"),
    ]
}

/// Counts calls per trace; when gated, each fetch waits for one [`release`](Self::release).
pub(crate) struct StubSource {
    spans: Vec<SpanRecord>,
    trace_calls: Mutex<HashMap<String, usize>>,
    metrics_calls: AtomicUsize,
    failures_left: AtomicUsize,
    gate: Option<Notify>,
}

impl StubSource {
    pub(crate) fn new(spans: Vec<SpanRecord>) -> Self {
        Self {
            spans,
            trace_calls: Mutex::new(HashMap::new()),
            metrics_calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub(crate) fn gated(spans: Vec<SpanRecord>) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new(spans)
        }
    }

    /// Fails the next `count` trace fetches.
    pub(crate) fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn trace_calls(&self, trace_id: &str) -> usize {
        self.trace_calls
            .lock()
            .unwrap()
            .get(trace_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    async fn wait_for_release(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl SpanSource for StubSource {
    async fn fetch_root_spans(
        &self,
        _query: &str,
        offset: usize,
        size: usize,
    ) -> Result<Vec<SpanRecord>, FetchError> {
        Ok(self
            .spans
            .iter()
            .filter(|span| span.parent_id().is_none())
            .skip(offset)
            .take(size)
            .cloned()
            .collect())
    }

    async fn fetch_all_spans_for_trace(
        &self,
        trace_id: &str,
        limit: usize,
    ) -> Result<Vec<SpanRecord>, FetchError> {
        {
            let mut calls = self.trace_calls.lock().unwrap();
            *calls.entry(trace_id.to_string()).or_default() += 1;
        }

        self.wait_for_release().await;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FetchError::Backend("connection reset".into()));
        }

        Ok(self
            .spans
            .iter()
            .filter(|span| span.trace_id == trace_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_trace_metrics(&self, _query: &str) -> Result<TraceMetrics, FetchError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_for_release().await;
        Ok(TraceMetrics {
            trace_count: 2,
            span_count: self.spans.len() as u64,
            ..Default::default()
        })
    }
}

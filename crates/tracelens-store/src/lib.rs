//! SQLite span storage for tracelens.
//!
//! [`TraceStore`] persists raw span records and answers the three queries the
//! trace views need: root-span pages, full traces, and aggregate metrics.

mod store;

pub use store::{StoreError, TraceStore};

use async_trait::async_trait;
use tracelens_core::{FetchError, SpanRecord, SpanSource, TraceMetrics};

impl From<StoreError> for FetchError {
    fn from(e: StoreError) -> Self {
        FetchError::Backend(e.to_string())
    }
}

#[async_trait]
impl SpanSource for TraceStore {
    async fn fetch_root_spans(
        &self,
        query: &str,
        offset: usize,
        size: usize,
    ) -> Result<Vec<SpanRecord>, FetchError> {
        Ok(self.list_root_spans(query, offset, size)?)
    }

    async fn fetch_all_spans_for_trace(
        &self,
        trace_id: &str,
        limit: usize,
    ) -> Result<Vec<SpanRecord>, FetchError> {
        Ok(self.get_spans(trace_id, limit)?)
    }

    async fn fetch_trace_metrics(&self, query: &str) -> Result<TraceMetrics, FetchError> {
        Ok(self.trace_metrics(query)?)
    }
}

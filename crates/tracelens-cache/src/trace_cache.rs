//! Per-trace cache of fully loaded span forests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracelens_core::{CacheEntry, SpanSource};
use tracelens_engine::build_tree;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Renders raw timestamps for display; injected by the presentation layer.
pub type TimestampFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Immutable view of every cache entry at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: Arc<HashMap<String, CacheEntry>>,
}

impl CacheSnapshot {
    pub fn get(&self, trace_id: &str) -> CacheEntry {
        self.entries.get(trace_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps are swapped wholesale on every change so snapshots never see a partial update.
#[derive(Default)]
struct CacheState {
    entries: Arc<HashMap<String, CacheEntry>>,
    /// Trace id -> id of the request allowed to write its result.
    in_flight: Arc<HashMap<String, Uuid>>,
}

impl CacheState {
    fn set_entry(&mut self, trace_id: &str, entry: CacheEntry) {
        let mut next = (*self.entries).clone();
        next.insert(trace_id.to_string(), entry);
        self.entries = Arc::new(next);
    }

    fn start_request(&mut self, trace_id: &str, request_id: Uuid) {
        let mut next = (*self.in_flight).clone();
        next.insert(trace_id.to_string(), request_id);
        self.in_flight = Arc::new(next);
    }

    fn finish_request(&mut self, trace_id: &str) {
        let mut next = (*self.in_flight).clone();
        next.remove(trace_id);
        self.in_flight = Arc::new(next);
    }
}

/// Loads full span trees on demand, with at most one outstanding fetch per trace.
///
/// `Uninitialized -> Loading -> Ready | Error`; an errored trace is fetched
/// again on the next [`expand`](Self::expand).
pub struct TraceCache {
    source: Arc<dyn SpanSource>,
    formatter: TimestampFormatter,
    span_limit: usize,
    state: Mutex<CacheState>,
}

impl TraceCache {
    pub fn new(source: Arc<dyn SpanSource>, formatter: TimestampFormatter, span_limit: usize) -> Self {
        Self {
            source,
            formatter,
            span_limit,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Fetches and builds the full tree for `trace_id` unless it is ready or already loading.
    ///
    /// Returns the entry as it stands once this call is done with it.
    pub async fn expand(&self, trace_id: &str) -> CacheEntry {
        let request_id = {
            let mut state = self.state();
            if state.in_flight.contains_key(trace_id) {
                debug!(trace_id, "Trace fetch already in flight");
                return CacheEntry::Loading;
            }
            if let Some(entry @ CacheEntry::Ready { .. }) = state.entries.get(trace_id) {
                return entry.clone();
            }

            let request_id = Uuid::new_v4();
            state.start_request(trace_id, request_id);
            state.set_entry(trace_id, CacheEntry::Loading);
            request_id
        };
        let mut pending = PendingRequest {
            cache: self,
            trace_id,
            request_id,
            settled: false,
        };

        debug!(trace_id, limit = self.span_limit, "Fetching trace spans");
        let entry = match self
            .source
            .fetch_all_spans_for_trace(trace_id, self.span_limit)
            .await
        {
            Ok(spans) => {
                let tree = build_tree(&spans, &*self.formatter);
                debug!(trace_id, spans = spans.len(), roots = tree.len(), "Trace loaded");
                CacheEntry::Ready { tree: Arc::new(tree) }
            }
            Err(e) => {
                warn!(trace_id, error = %e, "Failed to fetch trace spans");
                CacheEntry::Error {
                    message: e.to_string(),
                }
            }
        };

        pending.settled = true;
        let mut state = self.state();
        if state.in_flight.get(trace_id) != Some(&request_id) {
            debug!(trace_id, "Discarding result of a request superseded by refresh");
            return state.entries.get(trace_id).cloned().unwrap_or_default();
        }
        state.finish_request(trace_id);
        state.set_entry(trace_id, entry.clone());
        entry
    }

    /// Current entry for `trace_id` without triggering a fetch.
    pub fn entry(&self, trace_id: &str) -> CacheEntry {
        self.snapshot().get(trace_id)
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            entries: self.state().entries.clone(),
        }
    }

    pub fn is_in_flight(&self, trace_id: &str) -> bool {
        self.state().in_flight.contains_key(trace_id)
    }

    /// Drops every entry and in-flight marker; fetches already running cannot write back.
    pub fn refresh(&self) {
        let mut state = self.state();
        let dropped = state.entries.len();
        state.entries = Arc::new(HashMap::new());
        state.in_flight = Arc::new(HashMap::new());
        info!(dropped, "Trace cache cleared");
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Undoes the in-flight marker of an `expand` dropped before its fetch settled.
///
/// A cancelled request must not leave the trace `Loading` until the next refresh.
struct PendingRequest<'a> {
    cache: &'a TraceCache,
    trace_id: &'a str,
    request_id: Uuid,
    settled: bool,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.cache.state();
        if state.in_flight.get(self.trace_id) == Some(&self.request_id) {
            debug!(trace_id = self.trace_id, "Trace fetch cancelled, resetting entry");
            state.finish_request(self.trace_id);
            state.set_entry(self.trace_id, CacheEntry::Uninitialized);
        }
    }
}

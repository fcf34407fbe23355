//! Single-slot deduplication of trace metrics requests.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use tracelens_core::{FetchError, SpanSource, TraceMetrics};
use tracing::debug;
use uuid::Uuid;

type MetricsResult = Result<Arc<TraceMetrics>, FetchError>;

struct InFlight {
    key: String,
    id: Uuid,
    future: Shared<BoxFuture<'static, MetricsResult>>,
}

/// Holds at most one in-flight metrics request.
///
/// Callers asking for the key currently in flight await that same request and
/// receive the same `Arc`. A request for another key takes over the slot. The
/// slot is emptied once its request settles, unless a newer request has taken
/// it over in the meantime.
#[derive(Default)]
pub struct MetricsSlot {
    slot: Mutex<Option<InFlight>>,
}

impl MetricsSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fetch` for `key`, or joins the request already in flight for it.
    pub async fn fetch<F, Fut>(&self, key: &str, fetch: F) -> MetricsResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TraceMetrics, FetchError>> + Send + 'static,
    {
        let (id, future) = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(current) if current.key == key => {
                    debug!(key, "Joining in-flight metrics request");
                    (current.id, current.future.clone())
                }
                _ => {
                    let id = Uuid::new_v4();
                    let future = fetch().map_ok(Arc::new).boxed().shared();
                    *slot = Some(InFlight {
                        key: key.to_string(),
                        id,
                        future: future.clone(),
                    });
                    (id, future)
                }
            }
        };

        let result = future.await;

        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|current| current.id == id) {
            *slot = None;
        }
        result
    }

    /// Fetches trace metrics for `query` from `source` through the slot.
    pub async fn fetch_metrics(&self, source: &Arc<dyn SpanSource>, query: &str) -> MetricsResult {
        let source = Arc::clone(source);
        let owned_query = query.to_string();
        self.fetch(query, move || async move {
            source.fetch_trace_metrics(&owned_query).await
        })
        .await
    }

    /// Key of the request currently holding the slot.
    pub fn in_flight_key(&self) -> Option<String> {
        self.slot().as_ref().map(|current| current.key.clone())
    }

    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Shared server state.

use std::sync::Arc;

use tracelens_cache::{MetricsSlot, TimestampFormatter, TraceCache};
use tracelens_config::TraceLensConfig;
use tracelens_core::SpanSource;
use tracelens_store::TraceStore;

use crate::format::display_formatter;

pub struct ServerState {
    pub config: TraceLensConfig,
    pub store: Arc<TraceStore>,
    pub source: Arc<dyn SpanSource>,
    pub cache: TraceCache,
    pub metrics: MetricsSlot,
    pub formatter: TimestampFormatter,
}

impl ServerState {
    pub fn new(config: TraceLensConfig, store: Arc<TraceStore>) -> Self {
        let source: Arc<dyn SpanSource> = store.clone();
        let formatter =
            display_formatter(config.display_utc_offset_minutes, &config.timestamp_format);
        let cache = TraceCache::new(source.clone(), formatter.clone(), config.trace_span_limit);

        Self {
            config,
            store,
            source,
            cache,
            metrics: MetricsSlot::new(),
            formatter,
        }
    }
}

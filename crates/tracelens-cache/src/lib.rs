//! Asynchronous caches in front of a [`SpanSource`](tracelens_core::SpanSource).
//!
//! - [`TraceCache`]: per-trace loading state with in-flight deduplication and
//!   refresh-safe result routing
//! - [`MetricsSlot`]: a single-slot, key-matched share of one metrics request
//!
//! Both are plain values owned by the composing application; nothing here is
//! process-global, so independent instances never interfere.

mod metrics;
mod trace_cache;

#[cfg(test)]
mod testing;

pub use metrics::MetricsSlot;
pub use trace_cache::{CacheSnapshot, TimestampFormatter, TraceCache};

//! Core domain types and collaborator contracts for tracelens.
//!
//! This crate provides the plain data shared across the tracelens workspace:
//!
//! - [`SpanRecord`]: a flat span as returned by the query backend
//! - [`TreeNode`]: a span placed in a reconstructed forest
//! - [`TimelineRow`] and [`TimeRange`]: flattened Gantt rows and the axis bound
//! - [`CacheEntry`]: per-trace loading state
//! - [`SpanSource`]: the asynchronous fetch contract implemented by backends
//! - [`ThemeTokens`]: the colour lookup injected by the presentation layer
//!
//! # Example
//!
//! ```rust
//! use tracelens_core::{SpanRecord, SpanStatus};
//!
//! let span = SpanRecord::new("span-1", "trace-1")
//!     .with_parent("span-0")
//!     .with_operation("chat")
//!     .with_status_code(2);
//!
//! assert_eq!(span.parent_id(), Some("span-0"));
//! assert_eq!(span.status(), SpanStatus::Error);
//! ```

mod span;
mod tree;

pub use span::{SpanRecord, SpanStatus};
pub use tree::{CacheEntry, Category, TimeRange, TimelineRow, TraceMetrics, TreeNode};

use async_trait::async_trait;
use thiserror::Error;

/// Placeholder shown for values that are missing or not meaningful.
pub const NO_VALUE: &str = "—";

/// Errors surfaced by a [`SpanSource`].
///
/// Cloneable so one settled fetch can be handed to every caller that awaited it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The backend rejected or failed the request.
    #[error("Backend request failed: {0}")]
    Backend(String),

    /// The requested trace or query target does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend answered with data that could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// The query backend that spans are fetched from.
///
/// Every method may fail; callers treat any error uniformly as a fetch failure.
#[async_trait]
pub trait SpanSource: Send + Sync {
    /// One page of root spans matching `query`.
    async fn fetch_root_spans(
        &self,
        query: &str,
        offset: usize,
        size: usize,
    ) -> Result<Vec<SpanRecord>, FetchError>;

    /// Every span of one trace, up to `limit` records.
    async fn fetch_all_spans_for_trace(
        &self,
        trace_id: &str,
        limit: usize,
    ) -> Result<Vec<SpanRecord>, FetchError>;

    /// Aggregate counts and latency percentiles for the traces matching `query`.
    async fn fetch_trace_metrics(&self, query: &str) -> Result<TraceMetrics, FetchError>;
}

/// Resolves the display colour of a span category.
pub trait ThemeTokens: Send + Sync {
    fn color(&self, category: Category) -> String;
}

impl<F> ThemeTokens for F
where
    F: Fn(Category) -> String + Send + Sync,
{
    fn color(&self, category: Category) -> String {
        self(category)
    }
}

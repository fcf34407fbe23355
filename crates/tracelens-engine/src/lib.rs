//! Span hierarchy reconstruction and trace exploration for tracelens.
//!
//! Turns flat span batches into navigable structures:
//!
//! - [`time`]: timestamp and duration parsing/formatting
//! - [`category`]: operation-name taxonomy and display metadata
//! - [`hierarchy`]: forest building with orphan promotion
//! - [`timeline`]: Gantt axis bounds and visible rows
//! - [`summary`]: summary-bar totals
//!
//! Everything here is synchronous and never fails: malformed input degrades
//! to documented defaults instead of aborting a batch.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use tracelens_core::{Category, SpanRecord};
//! use tracelens_engine::{build_tree, calculate_timeline_range, flatten_visible_nodes};
//!
//! let spans = vec![
//!     SpanRecord::new("root", "t1").with_times("2025-01-01 00:00:00", "2025-01-01 00:00:01"),
//!     SpanRecord::new("child", "t1").with_parent("root").with_operation("chat"),
//! ];
//! let forest = build_tree(&spans, |ts| ts.to_string());
//! let theme = |c: Category| c.as_str().to_lowercase();
//!
//! let rows = flatten_visible_nodes(&forest, &HashSet::new(), &theme);
//! assert_eq!(rows.len(), 1);
//! assert_eq!(calculate_timeline_range(&forest).duration_ms, 1000.0);
//! ```

pub mod category;
pub mod hierarchy;
pub mod summary;
pub mod time;
pub mod timeline;

pub use category::{categorize, categorize_tree, category_metadata, CategorizedNode, CategoryMetadata};
pub use hierarchy::{build_shallow_tree, build_tree, count_spans, find_node, flatten_tree, sum_tokens};
pub use summary::{summarize, TraceSummary};
pub use time::{format_duration_from_nanos, parse_latency_ms_from_label, parse_timestamp_ms};
pub use timeline::{
    calculate_timeline_range, expandable_ids, extract_timestamps, flatten_visible_nodes,
    SpanTimestamps,
};

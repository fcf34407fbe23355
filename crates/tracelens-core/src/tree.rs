//! Derived structures: span forests, timeline rows and per-trace cache state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::span::{SpanRecord, SpanStatus};

/// Semantic role of a span's operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Agent,
    Llm,
    Tool,
    Content,
    Embeddings,
    Retrieval,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Agent,
        Category::Llm,
        Category::Tool,
        Category::Content,
        Category::Embeddings,
        Category::Retrieval,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Agent => "AGENT",
            Category::Llm => "LLM",
            Category::Tool => "TOOL",
            Category::Content => "CONTENT",
            Category::Embeddings => "EMBEDDINGS",
            Category::Retrieval => "RETRIEVAL",
            Category::Other => "OTHER",
        }
    }

    /// Parses the upper-case identifier; unknown names yield `None`.
    pub fn from_id(id: &str) -> Option<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(id))
    }
}

/// A span placed in a reconstructed forest.
///
/// Built once per hierarchy build and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub operation_kind: Option<String>,
    /// Start time rendered by the caller's formatter.
    pub start_time: String,
    /// End time rendered by the caller's formatter.
    pub end_time: String,
    /// Pre-formatted duration label (e.g. "5.50ms", "1.20s").
    pub latency: String,
    pub status: SpanStatus,
    /// Total tokens; `None` when the span reports no token usage.
    pub total_tokens: Option<u64>,
    /// Depth in the forest, roots are 0.
    pub level: usize,
    /// Children ordered by start time.
    pub children: Vec<TreeNode>,
    /// Whether at least one child is known (always true for shallow roots).
    pub is_expandable: bool,
    /// The record this node was built from.
    pub source: Arc<SpanRecord>,
}

impl TreeNode {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// One visible row of the Gantt view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRow {
    pub span_id: String,
    pub name: String,
    pub depth: usize,
    pub start_ms: f64,
    pub end_ms: f64,
    pub duration_ms: f64,
    pub category: Category,
    pub color: String,
    pub status: SpanStatus,
    /// True when the node has children, regardless of expansion.
    pub has_children: bool,
    pub is_expanded: bool,
}

/// Global time bound over every node of a forest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub min_ms: f64,
    pub max_ms: f64,
    pub duration_ms: f64,
}

impl TimeRange {
    /// Left offset and width of a bar as fractions of the axis.
    pub fn bar_position(&self, start_ms: f64, end_ms: f64) -> (f64, f64) {
        if self.duration_ms <= 0.0 || start_ms <= 0.0 {
            return (0.0, 0.0);
        }
        let left = ((start_ms - self.min_ms) / self.duration_ms).clamp(0.0, 1.0);
        let width = ((end_ms.max(start_ms) - start_ms) / self.duration_ms).clamp(0.0, 1.0 - left);
        (left, width)
    }
}

/// Loading state of one trace's full span tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CacheEntry {
    #[default]
    Uninitialized,
    Loading,
    Ready { tree: Arc<Vec<TreeNode>> },
    Error { message: String },
}

impl CacheEntry {
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheEntry::Ready { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, CacheEntry::Loading)
    }

    pub fn tree(&self) -> Option<&[TreeNode]> {
        match self {
            CacheEntry::Ready { tree } => Some(tree.as_slice()),
            _ => None,
        }
    }
}

/// Aggregate trace metrics shown in the summary bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMetrics {
    pub trace_count: u64,
    pub span_count: u64,
    pub error_count: u64,
    pub total_tokens: u64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

//! Totals for the trace summary bar.

use serde::Serialize;
use tracelens_core::TreeNode;

use crate::hierarchy::{count_spans, flatten_tree, sum_tokens};
use crate::time::parse_latency_ms_from_label;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub span_count: usize,
    pub error_count: usize,
    pub total_tokens: u64,
    /// Sum of root latencies, read back from their formatted labels.
    pub root_latency_ms: f64,
}

pub fn summarize(forest: &[TreeNode]) -> TraceSummary {
    TraceSummary {
        span_count: count_spans(forest),
        error_count: flatten_tree(forest)
            .iter()
            .filter(|node| node.status.is_error())
            .count(),
        total_tokens: sum_tokens(forest),
        root_latency_ms: forest
            .iter()
            .map(|root| parse_latency_ms_from_label(&root.latency))
            .sum(),
    }
}

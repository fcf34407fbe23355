//! Gantt timeline layout over span forests.
//!
//! The axis bound is computed over every node so bars keep their position
//! while branches are expanded or collapsed; only the row list depends on the
//! expand set.

use std::collections::HashSet;

use serde::Serialize;
use tracelens_core::{ThemeTokens, TimeRange, TimelineRow, TreeNode};

use crate::category::categorize;
use crate::time::parse_timestamp_ms;

/// Resolved start and end of one span, in epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanTimestamps {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl SpanTimestamps {
    pub fn duration_ms(&self) -> f64 {
        if self.start_ms > 0.0 && self.end_ms > self.start_ms {
            self.end_ms - self.start_ms
        } else {
            0.0
        }
    }
}

/// Start and end of a node.
///
/// A raw start paired with the nanosecond duration wins, since some sources
/// omit the end time but always carry a precise duration. Otherwise both raw
/// timestamps are parsed; unresolvable values are 0.
pub fn extract_timestamps(node: &TreeNode) -> SpanTimestamps {
    let span = &node.source;
    let start_ms = parse_timestamp_ms(&span.start_time);

    if start_ms > 0.0 {
        if let Some(nanos) = span.resolved_duration_nanos() {
            return SpanTimestamps {
                start_ms,
                end_ms: start_ms + nanos / 1_000_000.0,
            };
        }
    }

    SpanTimestamps {
        start_ms,
        end_ms: parse_timestamp_ms(&span.end_time),
    }
}

/// Bounds of every positive start/end in the forest, ignoring expansion state.
pub fn calculate_timeline_range(forest: &[TreeNode]) -> TimeRange {
    let mut min_ms = f64::INFINITY;
    let mut max_ms = f64::NEG_INFINITY;
    let mut stack: Vec<&TreeNode> = forest.iter().collect();

    while let Some(node) = stack.pop() {
        let ts = extract_timestamps(node);
        for value in [ts.start_ms, ts.end_ms] {
            if value > 0.0 {
                min_ms = min_ms.min(value);
                max_ms = max_ms.max(value);
            }
        }
        stack.extend(node.children.iter());
    }

    if !min_ms.is_finite() {
        return TimeRange::default();
    }

    TimeRange {
        min_ms,
        max_ms,
        duration_ms: max_ms - min_ms,
    }
}

/// Pre-order rows for the visible part of the forest.
///
/// Every node encountered yields a row; a node's children are visited only
/// when its id is in `expanded`.
pub fn flatten_visible_nodes(
    forest: &[TreeNode],
    expanded: &HashSet<String>,
    theme: &dyn ThemeTokens,
) -> Vec<TimelineRow> {
    let mut rows = Vec::new();
    push_visible(forest, expanded, theme, 0, &mut rows);
    rows
}

/// Ids of every node that has children: the "expand all" set.
pub fn expandable_ids(forest: &[TreeNode]) -> HashSet<String> {
    let mut ids = HashSet::new();
    let mut stack: Vec<&TreeNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        if node.has_children() {
            ids.insert(node.span_id.clone());
        }
        stack.extend(node.children.iter());
    }
    ids
}

fn push_visible(
    nodes: &[TreeNode],
    expanded: &HashSet<String>,
    theme: &dyn ThemeTokens,
    depth: usize,
    rows: &mut Vec<TimelineRow>,
) {
    for node in nodes {
        let ts = extract_timestamps(node);
        let category = categorize(&node.source);
        let is_expanded = expanded.contains(&node.span_id);

        rows.push(TimelineRow {
            span_id: node.span_id.clone(),
            name: node.name.clone(),
            depth,
            start_ms: ts.start_ms,
            end_ms: ts.end_ms,
            duration_ms: ts.duration_ms(),
            category,
            color: theme.color(category),
            status: node.status,
            has_children: node.has_children(),
            is_expanded,
        });

        if is_expanded {
            push_visible(&node.children, expanded, theme, depth + 1, rows);
        }
    }
}

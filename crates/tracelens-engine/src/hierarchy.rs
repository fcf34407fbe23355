//! Reconstruction of span forests from flat, partially fetched batches.
//!
//! Root-span pages and full-trace fetches are separate queries, so a batch
//! routinely references parents it does not contain. Such spans become roots
//! of their own subtree; the result is always a forest.

use std::collections::HashMap;
use std::sync::Arc;

use tracelens_core::{SpanRecord, TreeNode, NO_VALUE};
use tracing::debug;

use crate::time::{format_duration_from_nanos, parse_timestamp_ms};

/// Builds the full forest for a batch of spans.
///
/// `format_timestamp` renders the display start/end times; ordering always
/// uses the raw timestamps. Children are sorted by start time with ties kept
/// in batch order, roots stay in batch order.
pub fn build_tree<F>(spans: &[SpanRecord], format_timestamp: F) -> Vec<TreeNode>
where
    F: Fn(&str) -> String,
{
    let mut slots: Vec<Option<TreeNode>> = spans
        .iter()
        .map(|span| Some(to_node(span, &format_timestamp)))
        .collect();

    // Span ids are only unique within a trace.
    let index: HashMap<(&str, &str), usize> = spans
        .iter()
        .enumerate()
        .map(|(i, span)| ((span.trace_id.as_str(), span.span_id.as_str()), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); spans.len()];
    let mut roots = Vec::new();
    for (i, span) in spans.iter().enumerate() {
        let parent = span
            .parent_id()
            .and_then(|parent| index.get(&(span.trace_id.as_str(), parent)))
            .copied();
        match parent {
            Some(parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let start_ms: Vec<f64> = spans
        .iter()
        .map(|span| parse_timestamp_ms(&span.start_time))
        .collect();
    for list in &mut children {
        list.sort_by(|a, b| start_ms[*a].total_cmp(&start_ms[*b]));
    }

    let mut forest: Vec<TreeNode> = roots
        .iter()
        .filter_map(|&root| assemble(root, 0, &mut slots, &children))
        .collect();

    // Parent chains that loop back on themselves never reach a root.
    for i in 0..slots.len() {
        if slots[i].is_some() {
            debug!(span_id = %spans[i].span_id, "Breaking parent cycle, promoting span to root");
            if let Some(node) = assemble(i, 0, &mut slots, &children) {
                forest.push(node);
            }
        }
    }

    debug!(spans = spans.len(), roots = forest.len(), "Built span forest");
    forest
}

/// Builds the forest for the root-span table.
///
/// Top-level rows are always expandable because their children are fetched
/// lazily; a row may turn out to have none once its trace is loaded.
pub fn build_shallow_tree<F>(spans: &[SpanRecord], format_timestamp: F) -> Vec<TreeNode>
where
    F: Fn(&str) -> String,
{
    let mut forest = build_tree(spans, format_timestamp);
    for root in &mut forest {
        root.is_expandable = true;
    }
    forest
}

/// Depth-first, parent-before-children listing of every node.
pub fn flatten_tree(forest: &[TreeNode]) -> Vec<&TreeNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&TreeNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}

pub fn find_node<'a>(forest: &'a [TreeNode], span_id: &str) -> Option<&'a TreeNode> {
    flatten_tree(forest)
        .into_iter()
        .find(|node| node.span_id == span_id)
}

pub fn count_spans(forest: &[TreeNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + count_spans(&node.children))
        .sum()
}

/// Sum of known token totals; nodes without token usage count as 0.
pub fn sum_tokens(forest: &[TreeNode]) -> u64 {
    forest
        .iter()
        .map(|node| node.total_tokens.unwrap_or(0) + sum_tokens(&node.children))
        .sum()
}

fn assemble(
    idx: usize,
    level: usize,
    slots: &mut [Option<TreeNode>],
    children: &[Vec<usize>],
) -> Option<TreeNode> {
    let mut node = slots[idx].take()?;
    node.level = level;
    node.children = children[idx]
        .iter()
        .filter_map(|&child| assemble(child, level + 1, slots, children))
        .collect();
    node.is_expandable = !node.children.is_empty();
    Some(node)
}

fn to_node<F>(span: &SpanRecord, format_timestamp: &F) -> TreeNode
where
    F: Fn(&str) -> String,
{
    TreeNode {
        span_id: span.span_id.clone(),
        trace_id: span.trace_id.clone(),
        parent_span_id: span.parent_id().map(str::to_string),
        name: span.name.clone(),
        operation_kind: span.operation_kind.clone(),
        start_time: format_timestamp(&span.start_time),
        end_time: format_timestamp(&span.end_time),
        latency: latency_label(span),
        status: span.status(),
        total_tokens: span.resolved_total_tokens(),
        level: 0,
        children: Vec::new(),
        is_expandable: false,
        source: Arc::new(span.clone()),
    }
}

fn latency_label(span: &SpanRecord) -> String {
    if let Some(nanos) = span.resolved_duration_nanos() {
        return format_duration_from_nanos(nanos);
    }
    let start = parse_timestamp_ms(&span.start_time);
    let end = parse_timestamp_ms(&span.end_time);
    if start > 0.0 && end > start {
        return format_duration_from_nanos((end - start) * 1_000_000.0);
    }
    NO_VALUE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, parent: Option<&str>, start: &str) -> SpanRecord {
        let mut span = SpanRecord::new(id, "trace-1").with_name(id);
        span.parent_span_id = parent.map(str::to_string);
        span.start_time = start.to_string();
        span
    }

    fn ids(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.span_id.as_str()).collect()
    }

    fn identity(s: &str) -> String {
        s.to_string()
    }

    fn assert_levels(nodes: &[TreeNode], level: usize) {
        for node in nodes {
            assert_eq!(node.level, level, "level of {}", node.span_id);
            assert_levels(&node.children, level + 1);
        }
    }

    #[test]
    fn test_links_children_and_sets_levels() {
        let spans = vec![
            span("root", None, "2025-01-01 00:00:00"),
            span("a", Some("root"), "2025-01-01 00:00:01"),
            span("b", Some("a"), "2025-01-01 00:00:02"),
        ];
        let forest = build_tree(&spans, identity);

        assert_eq!(ids(&forest), vec!["root"]);
        assert!(forest[0].is_expandable);
        assert_eq!(forest[0].children[0].span_id, "a");
        assert_eq!(forest[0].children[0].children[0].level, 2);
        assert!(!forest[0].children[0].children[0].is_expandable);
        assert_levels(&forest, 0);
    }

    #[test]
    fn test_orphans_become_roots() {
        let spans = vec![
            span("root", None, "2025-01-01 00:00:00"),
            span("orphan", Some("missing-parent"), "2025-01-01 00:00:01"),
            span("empty-parent", Some(""), "2025-01-01 00:00:02"),
            span("child", Some("orphan"), "2025-01-01 00:00:03"),
        ];
        let forest = build_tree(&spans, identity);

        assert_eq!(ids(&forest), vec!["root", "orphan", "empty-parent"]);
        assert_eq!(forest[1].level, 0);
        assert_eq!(forest[1].children[0].span_id, "child");
        assert_eq!(forest[1].children[0].level, 1);
    }

    #[test]
    fn test_span_ids_resolve_within_their_own_trace() {
        let spans = vec![
            SpanRecord::new("root", "trace-a").with_times("2025-01-01 00:00:00", ""),
            SpanRecord::new("child", "trace-a")
                .with_parent("root")
                .with_times("2025-01-01 00:00:01", ""),
            SpanRecord::new("root", "trace-b").with_times("2025-01-01 00:00:02", ""),
            SpanRecord::new("child", "trace-b")
                .with_parent("root")
                .with_times("2025-01-01 00:00:03", ""),
        ];
        let forest = build_tree(&spans, identity);

        assert_eq!(forest.len(), 2);
        for (root, trace) in forest.iter().zip(["trace-a", "trace-b"]) {
            assert_eq!(root.trace_id, trace);
            assert_eq!(root.children.len(), 1);
            assert_eq!(root.children[0].trace_id, trace);
        }
        assert_eq!(count_spans(&forest), 4);
    }

    #[test]
    fn test_children_sorted_by_raw_start_time() {
        let spans = vec![
            span("root", None, "2025-01-01 00:00:00"),
            span("late", Some("root"), "2025-01-01 00:00:00.900"),
            span("early", Some("root"), "2025-01-01 00:00:00.100"),
            span("sub-ms", Some("root"), "2025-01-01 00:00:00.100500"),
        ];
        // The formatter scrambles display strings; ordering must not depend on them.
        let forest = build_tree(&spans, |_| "same".to_string());

        assert_eq!(ids(&forest[0].children), vec!["early", "sub-ms", "late"]);
        assert_eq!(forest[0].children[0].start_time, "same");
    }

    #[test]
    fn test_sort_is_stable_for_equal_start_times() {
        let spans = vec![
            span("root", None, "2025-01-01 00:00:00"),
            span("first", Some("root"), "2025-01-01 00:00:05"),
            span("second", Some("root"), "2025-01-01 00:00:05"),
            span("third", Some("root"), "2025-01-01 00:00:05"),
            span("zero", Some("root"), "garbage"),
        ];
        let forest = build_tree(&spans, identity);

        assert_eq!(
            ids(&forest[0].children),
            vec!["zero", "first", "second", "third"]
        );
    }

    #[test]
    fn test_every_node_reachable_once_even_with_cycles() {
        let spans = vec![
            span("root", None, ""),
            span("x", Some("y"), ""),
            span("y", Some("x"), ""),
            span("self", Some("self"), ""),
            span("leaf", Some("root"), ""),
        ];
        let forest = build_tree(&spans, identity);

        let mut all: Vec<&str> = flatten_tree(&forest)
            .iter()
            .map(|n| n.span_id.as_str())
            .collect();
        all.sort();
        assert_eq!(all, vec!["leaf", "root", "self", "x", "y"]);
        assert_eq!(count_spans(&forest), spans.len());
        assert_levels(&forest, 0);
        assert_eq!(ids(&forest), vec!["root", "self", "x"]);
        assert_eq!(forest[2].children[0].span_id, "y");
    }

    #[test]
    fn test_shallow_tree_marks_roots_expandable() {
        let spans = vec![
            span("r1", None, "2025-01-01 00:00:00"),
            span("r2", None, "2025-01-01 00:00:01"),
        ];
        let shallow = build_shallow_tree(&spans, identity);
        assert!(shallow.iter().all(|n| n.is_expandable && n.children.is_empty()));

        let full = build_tree(&spans, identity);
        assert!(full.iter().all(|n| !n.is_expandable));
    }

    #[test]
    fn test_row_fields() {
        let mut record = span("s", None, "2025-01-01 00:00:00")
            .with_tokens(7, 3)
            .with_duration_nanos(5_500_000)
            .with_status_code(2);
        record.end_time = "2025-01-01 00:00:01".into();
        let forest = build_tree(&[record], |s| format!("<{s}>"));
        let node = &forest[0];

        assert_eq!(node.total_tokens, Some(10));
        assert_eq!(node.latency, "5.50ms");
        assert!(node.status.is_error());
        assert_eq!(node.start_time, "<2025-01-01 00:00:00>");
        assert_eq!(node.source.span_id, "s");
    }

    #[test]
    fn test_latency_falls_back_to_timestamps() {
        let record = span("s", None, "2025-01-01 00:00:00").with_times(
            "2025-01-01 00:00:00",
            "2025-01-01 00:00:02.5",
        );
        let forest = build_tree(&[record], identity);
        assert_eq!(forest[0].latency, "2.50s");
        assert_eq!(forest[0].total_tokens, None);
    }

    #[test]
    fn test_lookup_and_aggregates() {
        let spans = vec![
            span("root", None, "").with_tokens(1, 1),
            span("a", Some("root"), "").with_tokens(5, 5),
            span("b", Some("a"), ""),
        ];
        let forest = build_tree(&spans, identity);

        assert_eq!(count_spans(&forest), 3);
        assert_eq!(sum_tokens(&forest), 12);
        assert_eq!(find_node(&forest, "b").map(|n| n.level), Some(2));
        assert!(find_node(&forest, "nope").is_none());
        assert_eq!(
            flatten_tree(&forest)
                .iter()
                .map(|n| n.span_id.as_str())
                .collect::<Vec<_>>(),
            vec!["root", "a", "b"]
        );
    }

    #[test]
    fn test_empty_batch() {
        assert!(build_tree(&[], identity).is_empty());
        assert!(build_shallow_tree(&[], identity).is_empty());
    }
}

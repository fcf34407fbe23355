//! Trace exploration API handlers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracelens_core::{CacheEntry, TimeRange, TimelineRow, TreeNode};
use tracelens_engine::{
    build_shallow_tree, calculate_timeline_range, expandable_ids, flatten_visible_nodes,
    summarize, TraceSummary,
};

use crate::error::AppError;
use crate::ServerState;

/// Response for a page of root spans.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracesListResponse {
    pub traces: Vec<TreeNode>,
    pub offset: usize,
    pub limit: usize,
}

/// Loading state of one trace, plus its totals once loaded.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntryResponse {
    pub trace_id: String,
    #[serde(flatten)]
    pub entry: CacheEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TraceSummary>,
}

impl TraceEntryResponse {
    fn new(trace_id: String, entry: CacheEntry) -> Self {
        let summary = entry.tree().map(summarize);
        Self {
            trace_id,
            entry,
            summary,
        }
    }
}

/// A visible timeline row with its bar placed on the shared axis.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBar {
    #[serde(flatten)]
    pub row: TimelineRow,
    pub left: f64,
    pub width: f64,
}

#[derive(Serialize)]
pub struct TimelineResponse {
    pub range: TimeRange,
    pub rows: Vec<TimelineBar>,
}

/// Query parameters for listing root spans.
#[derive(Debug, Deserialize, Default)]
pub struct ListTracesQuery {
    #[serde(default)]
    pub query: String,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Query parameters for the timeline view.
#[derive(Debug, Deserialize, Default)]
pub struct TimelineQuery {
    /// Comma-separated span ids to expand, or `all`.
    pub expanded: Option<String>,
}

/// GET /api/traces - One page of root spans as a shallow forest.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListTracesQuery>,
) -> Result<Json<TracesListResponse>, AppError> {
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(state.config.page_size);

    let spans = state
        .source
        .fetch_root_spans(&params.query, offset, limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list root spans: {}", e);
            AppError::from(e)
        })?;

    let traces = build_shallow_tree(&spans, &*state.formatter);
    Ok(Json(TracesListResponse {
        traces,
        offset,
        limit,
    }))
}

/// POST /api/traces/{trace_id}/expand - Load the full span tree of a trace.
pub async fn expand(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Json<TraceEntryResponse> {
    let entry = state.cache.expand(&trace_id).await;
    Json(TraceEntryResponse::new(trace_id, entry))
}

/// GET /api/traces/{trace_id} - Current loading state without fetching.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Json<TraceEntryResponse> {
    let entry = state.cache.entry(&trace_id);
    Json(TraceEntryResponse::new(trace_id, entry))
}

/// GET /api/traces/{trace_id}/timeline - Axis bound and visible rows of a loaded trace.
pub async fn timeline(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
    Query(params): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>, AppError> {
    let tree = match state.cache.entry(&trace_id) {
        CacheEntry::Ready { tree } => tree,
        CacheEntry::Uninitialized => {
            return Err(AppError::NotFound(format!("trace {} is not loaded", trace_id)))
        }
        CacheEntry::Loading => {
            return Err(AppError::Conflict(format!("trace {} is still loading", trace_id)))
        }
        CacheEntry::Error { message } => return Err(AppError::Conflict(message)),
    };

    let expanded = match params.expanded.as_deref().map(str::trim) {
        Some("all") => expandable_ids(&tree),
        Some(list) => parse_expanded(list),
        None => HashSet::new(),
    };

    let range = calculate_timeline_range(&tree);
    let rows = flatten_visible_nodes(&tree, &expanded, &state.config.theme)
        .into_iter()
        .map(|row| {
            let (left, width) = range.bar_position(row.start_ms, row.end_ms);
            TimelineBar { row, left, width }
        })
        .collect();

    Ok(Json(TimelineResponse { range, rows }))
}

/// POST /api/traces/refresh - Drop every cached trace.
pub async fn refresh(State(state): State<Arc<ServerState>>) -> StatusCode {
    state.cache.refresh();
    StatusCode::NO_CONTENT
}

/// DELETE /api/traces/{trace_id} - Delete a trace from the store.
pub async fn delete(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.store.delete_trace(&trace_id).map_err(|e| {
        tracing::error!("Failed to delete trace: {}", e);
        AppError::internal("failed to delete trace")
    })?;

    if deleted == 0 {
        return Err(AppError::NotFound("trace not found".into()));
    }

    // Cached trees may still hold the deleted spans.
    state.cache.refresh();
    Ok(StatusCode::NO_CONTENT)
}

fn parse_expanded(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

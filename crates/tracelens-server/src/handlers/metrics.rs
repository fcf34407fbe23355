//! Trace metrics API handler.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracelens_core::TraceMetrics;

use crate::error::AppError;
use crate::ServerState;

#[derive(Debug, Deserialize, Default)]
pub struct MetricsQuery {
    #[serde(default)]
    pub query: String,
}

/// GET /api/metrics - Aggregate metrics, sharing the request already in flight for the same query.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<MetricsQuery>,
) -> Result<Json<TraceMetrics>, AppError> {
    let metrics = state
        .metrics
        .fetch_metrics(&state.source, &params.query)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get trace metrics: {}", e);
            AppError::from(e)
        })?;

    Ok(Json(TraceMetrics::clone(&metrics)))
}

mod error;
mod format;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracelens_config::TraceLensConfig;
use tracelens_store::TraceStore;
use tracing::{info, warn};

pub use state::ServerState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = TraceLensConfig::from_env().context("failed to load config")?;
    let state = Arc::new(init_server_state(config)?);
    let addr = state.config.bind_addr.clone();

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn init_server_state(config: TraceLensConfig) -> Result<ServerState> {
    let store = TraceStore::new(&config.database_path).with_context(|| {
        format!("failed to open span store at {}", config.database_path.display())
    })?;
    info!("Span store ready at {}", config.database_path.display());

    if let Some(seed) = &config.seed_path {
        match store.seed_from_file(seed) {
            Ok(count) => info!("Seeded {} spans from {}", count, seed.display()),
            Err(e) => warn!("Failed to seed spans from {}: {}", seed.display(), e),
        }
    }

    Ok(ServerState::new(config, Arc::new(store)))
}

fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let api_routes = Router::new()
        .route("/api/traces", get(handlers::traces::list))
        .route("/api/traces/refresh", post(handlers::traces::refresh))
        .route(
            "/api/traces/{trace_id}",
            get(handlers::traces::get).delete(handlers::traces::delete),
        )
        .route("/api/traces/{trace_id}/expand", post(handlers::traces::expand))
        .route("/api/traces/{trace_id}/timeline", get(handlers::traces::timeline))
        .route("/api/metrics", get(handlers::metrics::get))
        .layer(trace_layer);

    Router::new()
        .merge(api_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

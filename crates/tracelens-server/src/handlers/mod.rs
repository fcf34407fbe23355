//! HTTP route handlers for the trace server.

pub mod metrics;
pub mod traces;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

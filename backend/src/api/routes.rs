//! Route definitions for the API.

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::actor::actor_middleware;
use super::middleware::security_headers::security_headers_middleware;
use super::SharedState;

/// Room for multipart boundaries and metadata fields around the file.
const MULTIPART_ENVELOPE_BYTES: usize = 1024 * 1024;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    let upload_limit =
        usize::try_from(state.config.max_upload_bytes).unwrap_or(usize::MAX - MULTIPART_ENVELOPE_BYTES);

    Router::new()
        // Health endpoints (no actor required)
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(upload_limit: usize) -> Router<SharedState> {
    Router::new()
        .nest(
            "/evidence",
            handlers::evidence::router().layer(DefaultBodyLimit::max(
                upload_limit.saturating_add(MULTIPART_ENVELOPE_BYTES),
            )),
        )
        .nest(
            "/cases",
            handlers::cases::router().layer(DefaultBodyLimit::max(1024 * 1024)), // 1 MB
        )
        .nest(
            "/admin",
            handlers::admin::router().layer(DefaultBodyLimit::max(1024 * 1024)), // 1 MB
        )
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(actor_middleware))
}

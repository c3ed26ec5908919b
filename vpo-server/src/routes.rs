//! Router assembly.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/library", get(handlers::library))
        .route("/api/library/{id}", get(handlers::library_detail))
        .route("/api/transcriptions", get(handlers::transcriptions))
        .route(
            "/api/transcriptions/{id}",
            get(handlers::transcriptions_detail),
        )
        .route("/api/jobs", get(handlers::jobs))
        .route("/api/jobs/{id}", get(handlers::job_detail))
        .route("/api/jobs/{id}/logs", get(handlers::job_logs))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

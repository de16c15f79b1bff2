//! Application setup and router configuration.

use axum::extract::Extension;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::jobs::JobEngine;
use crate::kernel::ServerDeps;
use crate::server::routes::{
    cleanup_expired_handler, complete_job_handler, health_handler, list_jobs_handler,
    submit_job_handler,
};

#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
    pub engine: JobEngine,
}

pub fn build_app(deps: ServerDeps) -> Router {
    let state = AppState {
        engine: JobEngine::new(deps.clone()),
        deps,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/jobs", post(submit_job_handler).get(list_jobs_handler))
        .route(
            "/api/v1/jobs/:external_id/complete",
            post(complete_job_handler),
        )
        .route("/api/v1/jobs/cleanup", post(cleanup_expired_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

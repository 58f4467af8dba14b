use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    demo_create_user, demo_duplicate, demo_empty, demo_forbidden, demo_get_user, demo_internal,
    demo_ok, demo_paginated, demo_persistence_validation, demo_raw, fallback, health, AppState,
};
use super::middleware::{error_handler, logging_middleware, ErrorHandler};
use crate::metrics;

pub fn create_router(state: AppState, errors: Arc<ErrorHandler>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health))
        // Metrics endpoint (Prometheus)
        .route("/metrics", get(metrics::metrics_handler))
        // Envelope and error demonstrations
        .route("/demo/ok", get(demo_ok))
        .route("/demo/empty", get(demo_empty))
        .route("/demo/paginated", get(demo_paginated))
        .route("/demo/users", post(demo_create_user))
        .route("/demo/users/:id", get(demo_get_user))
        .route("/demo/duplicate", get(demo_duplicate))
        .route("/demo/persistence", get(demo_persistence_validation))
        .route("/demo/forbidden", get(demo_forbidden))
        .route("/demo/internal", get(demo_internal))
        .route("/demo/raw", post(demo_raw))
        .fallback(fallback)
        // Add middleware (order matters: errors -> logging -> metrics -> cors -> trace)
        .layer(middleware::from_fn_with_state(errors, error_handler))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(metrics::middleware::track_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Add shared state
        .with_state(state)
}

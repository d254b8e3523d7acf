use axum::{
    http::{header, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use errors::AttemptError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        // Attempt ledger (requires JWT)
        .merge(attempts_routes(app_state.clone()))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn attempts_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/api/v1/attempts", post(handlers::attempts::start_attempt))
        .route("/api/v1/attempts/{id}", get(handlers::attempts::get_attempt))
        .route(
            "/api/v1/attempts/{id}/progress",
            patch(handlers::attempts::save_progress),
        )
        .route(
            "/api/v1/attempts/{id}/violations",
            post(handlers::attempts::record_violation),
        )
        .route(
            "/api/v1/attempts/{id}/close",
            post(handlers::attempts::close_attempt),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
        .layer(cors)
}

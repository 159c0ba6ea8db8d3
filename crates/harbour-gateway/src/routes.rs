//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main router
///
/// GET also answers HEAD; the body is dropped by the router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Operational probe
        .route("/_health", get(handlers::health_check))
        // Object endpoints
        .route("/{user}/{repo}/objects", post(handlers::post_object))
        .route(
            "/{user}/{repo}/objects/{oid}",
            get(handlers::get_object)
                .options(handlers::options_object)
                .put(handlers::put_object),
        )
        // Apply middleware
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}

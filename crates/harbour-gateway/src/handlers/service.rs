//! Operational endpoints

use axum::http::StatusCode;

/// GET /_health - Liveness probe
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

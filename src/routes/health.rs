// src/routes/health.rs
//! API health check endpoint for the equipment backend.
//!
//! This module defines the `/health` route used by container orchestrators
//! and CI pipelines to verify that the service is running and that its
//! storage backend answers. It follows the Explicit Module Boundary Pattern
//! (EMBP): the handler stays private and only a subrouter is exported to the
//! gateway (`mod.rs`).

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::storage::SharedRepository;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
}

/// Handle `GET /health`.
///
/// Returns `200` when the repository answers a trivial query and `503`
/// otherwise.
async fn health(State(repo): State<SharedRepository>) -> (StatusCode, Json<HealthResponse>) {
    match repo.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                storage: "ok",
            }),
        ),
        Err(e) => {
            warn!("Storage health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    storage: "unavailable",
                }),
            )
        }
    }
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<SharedRepository> {
    Router::new().route("/health", get(health))
}

//! Liveness and version endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub policy_version: String,
}

/// `GET /`: plain liveness probe.
pub async fn root() -> &'static str {
    "SERVER IS UP"
}

/// `GET /health`: service and policy versions.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        policy_version: ctx.policy().version().to_string(),
    })
}

//! Health check handler.

use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Health check handler.
///
/// Pings the database when one is configured. An unreachable database
/// reports "unhealthy" in the body rather than failing the request.
#[instrument(skip_all, name = "signal.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match &state.pool {
        Some(pool) => {
            let healthy = sqlx::query("SELECT 1").fetch_one(pool).await.is_ok();
            Some(if healthy { "healthy" } else { "unhealthy" })
        }
        None => None,
    };

    let status = match database {
        Some("unhealthy") => "unhealthy",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: database.map(str::to_string),
    })
}

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod events;
pub mod workflows;

pub use events::event_routes;
pub use workflows::workflow_routes;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match &state.db_pool {
        Some(pool) => {
            if crate::database::health_check(pool).await {
                "up"
            } else {
                "down"
            }
        }
        None => "not_configured",
    };

    let status = if database == "down" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let health = if status == StatusCode::OK { "healthy" } else { "degraded" };

    (
        status,
        Json(json!({"status": health, "service": "mint-workflows", "database": database})),
    )
}

//! Event intake
//!
//! Lets other processes raise domain events. The request returns as soon as
//! the event is on the bus; workflow outcomes are read from execution history.

use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::validation::Validator;
use crate::workflows::{EventPayload, EventSource, TriggerEvent};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    pub event_name: String,
    #[serde(default = "empty_payload")]
    pub payload: EventPayload,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishEventResponse {
    pub event_id: Uuid,
}

fn empty_payload() -> EventPayload {
    serde_json::json!({})
}

pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(publish_event))
}

async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishEventRequest>,
) -> ApiResult<(StatusCode, Json<PublishEventResponse>)> {
    Validator::new()
        .event_name(Some(&request.event_name), "event_name")
        .finish()?;

    let mut event = TriggerEvent::new(&request.event_name, request.payload, EventSource::Api);
    if let Some(correlation_id) = request.correlation_id {
        event = event.with_correlation_id(correlation_id);
    }

    let event_id = state.bus.emit(event);
    Ok((StatusCode::ACCEPTED, Json(PublishEventResponse { event_id })))
}

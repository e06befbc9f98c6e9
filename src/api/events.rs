//! HTTP event ingress.
//!
//! Operational entry point into the bridge facade for producers that live
//! outside the process. Always answers 202: the bridge's drop policy is
//! invisible to producers by design.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::{EventType, NotificationEvent};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub manga_id: Option<String>,
    #[serde(default)]
    pub chapter_number: Option<u32>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Serialize)]
pub struct PublishEventResponse {
    pub accepted: bool,
    pub timestamp: chrono::DateTime<Utc>,
}

/// POST /api/v1/events
#[tracing::instrument(
    name = "http.publish_event",
    skip(state, request),
    fields(event_type = request.event_type.as_str())
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Json(request): Json<PublishEventRequest>,
) -> (StatusCode, Json<PublishEventResponse>) {
    let event = NotificationEvent {
        event_type: request.event_type,
        message: request.message,
        user_id: request.user_id,
        manga_id: request.manga_id,
        chapter_number: request.chapter_number,
        rating: request.rating,
        room_id: request.room_id,
        occurred_at: Utc::now(),
    };

    state.bridge.publish(event);

    (
        StatusCode::ACCEPTED,
        Json(PublishEventResponse {
            accepted: true,
            timestamp: Utc::now(),
        }),
    )
}

//! Event API endpoints.
//!
//! Read-only:
//! - GET /api/v1/events - List every event
//! - GET /api/v1/events/:id - Get one event
//!
//! Every other verb is answered with 405 by the router.

use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use nest_core::model::{Event, EventId};
use nest_core::repository::EventRepository;
use nest_web::{AppError, WebResult};
use serde::Serialize;

/// Event as exposed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventResource {
    /// Absolute URL of this resource
    #[serde(rename = "self")]
    pub self_link: String,
    /// Display name
    pub name: String,
    /// Free text description
    pub description: String,
    /// Event homepage
    pub url: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl EventResource {
    /// Project an event, linking it under `base_url`.
    #[must_use]
    pub fn from_event(event: &Event, base_url: &str) -> Self {
        Self {
            self_link: event_url(base_url, event.id),
            name: event.name.clone(),
            description: event.description.clone(),
            url: event.url.clone(),
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// Absolute URL of the item endpoint for `id`.
#[must_use]
pub fn event_url(base_url: &str, id: EventId) -> String {
    format!("{}/api/v1/events/{id}", base_url.trim_end_matches('/'))
}

/// List every event, ordered by id.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8000/api/v1/events
/// ```
///
/// # Errors
///
/// Returns 500 if the repository fails.
pub async fn list_events<E, C>(State(state): State<AppState<E, C>>) -> WebResult<Json<Vec<EventResource>>>
where
    E: EventRepository,
{
    let events = state.events.list().await?;
    metrics::counter!("api.events.reads", "operation" => "list").increment(1);
    tracing::debug!(count = events.len(), "Listed events");

    Ok(Json(
        events
            .iter()
            .map(|event| EventResource::from_event(event, &state.public_base_url))
            .collect(),
    ))
}

/// Get one event.
///
/// An id that is not an integer cannot match any row and is reported as
/// not found, the same as a missing one.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8000/api/v1/events/1
/// ```
///
/// # Errors
///
/// Returns 404 for unknown or malformed ids and 500 if the repository fails.
pub async fn get_event<E, C>(
    State(state): State<AppState<E, C>>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<EventResource>>
where
    E: EventRepository,
{
    let Ok(id) = raw_id.parse::<i64>().map(EventId) else {
        return Err(AppError::not_found("Event", raw_id));
    };

    let event = state
        .events
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Event", id))?;
    metrics::counter!("api.events.reads", "operation" => "retrieve").increment(1);

    Ok(Json(EventResource::from_event(&event, &state.public_base_url)))
}

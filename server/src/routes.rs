//! Router configuration for the Nest server.

use crate::admin::chunks;
use crate::api::events;
use crate::state::AppState;
use axum::{Router, routing::get};
use nest_core::repository::{ChunkRepository, EventRepository};
use nest_web::handlers::{liveness, method_not_allowed, not_found};
use nest_web::{correlation_id_layer, trace_layer};

/// Build the complete Axum router.
///
/// - `GET /health`: liveness
/// - `GET /api/v1/events`, `GET /api/v1/events/:id`: read-only event API
/// - `GET /admin/ai/chunk`: operator-only chunk changelist
///
/// Every route is read-only: other verbs get a JSON 405 and unknown paths a
/// JSON 404. `HEAD` is served by the `GET` handlers without a body.
pub fn build_router<E, C>(state: AppState<E, C>) -> Router
where
    E: EventRepository + 'static,
    C: ChunkRepository + 'static,
{
    let api_routes = Router::new()
        .route(
            "/events",
            get(events::list_events::<E, C>).fallback(method_not_allowed),
        )
        .route(
            "/events/:id",
            get(events::get_event::<E, C>).fallback(method_not_allowed),
        );

    let admin_routes = Router::new().route(
        "/ai/chunk",
        get(chunks::changelist::<E, C>).fallback(method_not_allowed),
    );

    Router::new()
        .route("/health", get(liveness).fallback(method_not_allowed))
        .nest("/api/v1", api_routes)
        .nest("/admin", admin_routes)
        .fallback(not_found)
        .layer(trace_layer())
        .layer(correlation_id_layer())
        .with_state(state)
}

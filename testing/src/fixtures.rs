//! Sample records with deterministic timestamps.

use chrono::{DateTime, TimeZone, Utc};
use nest_core::model::{Chunk, ChunkId, Event, EventId};

/// Fixed creation time used by every fixture.
#[must_use]
pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 25, 2, 45, 0).unwrap()
}

/// Fixed update time, one day after [`created_at`].
#[must_use]
pub fn updated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 26, 2, 45, 0).unwrap()
}

/// Event with a slug-style url derived from its name.
#[must_use]
pub fn event(id: i64, name: &str) -> Event {
    let slug = name.to_lowercase().replace(' ', "-");
    Event::new(
        EventId(id),
        name,
        format!("{name} description"),
        format!("https://owasp.org/events/{slug}"),
        created_at(),
        updated_at(),
    )
    .unwrap()
}

/// Chunk with a generated context.
#[must_use]
pub fn chunk(id: i64, text: &str) -> Chunk {
    Chunk::new(ChunkId(id), text, format!("context of chunk {id}"))
}

//! Application state for the Nest HTTP server.

use crate::config::AdminConfig;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Generic over the repositories so the router runs unchanged against
/// `PostgreSQL` in production and the in-memory doubles in tests. Cloning is
/// cheap; everything sits behind an `Arc`.
pub struct AppState<E, C> {
    /// Event read access
    pub events: Arc<E>,
    /// Chunk search access
    pub chunks: Arc<C>,
    /// Absolute base for self links, without trailing slash
    pub public_base_url: Arc<str>,
    /// Chunk admin settings
    pub admin: Arc<AdminConfig>,
}

impl<E, C> AppState<E, C> {
    /// Create a new application state.
    #[must_use]
    pub fn new(events: E, chunks: C, public_base_url: &str, admin: AdminConfig) -> Self {
        Self {
            events: Arc::new(events),
            chunks: Arc::new(chunks),
            public_base_url: Arc::from(public_base_url.trim_end_matches('/')),
            admin: Arc::new(admin),
        }
    }
}

impl<E, C> Clone for AppState<E, C> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            chunks: Arc::clone(&self.chunks),
            public_base_url: Arc::clone(&self.public_base_url),
            admin: Arc::clone(&self.admin),
        }
    }
}

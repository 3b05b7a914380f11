//! Liveness endpoint.
//!
//! Used by load balancers and orchestrators to verify that the process is up.
//! It does not touch the database; readiness checks belong to the binary that
//! owns the pool.

use axum::Json;
use serde::Serialize;

/// Liveness response body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Liveness {
    /// Always `"ok"`
    pub status: &'static str,
    /// Crate version of the running binary
    pub version: &'static str,
}

/// Liveness probe.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0"
/// }
/// ```
#[allow(clippy::unused_async)]
pub async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

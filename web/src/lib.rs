//! Axum integration for the Nest backend.
//!
//! Shared HTTP plumbing used by the `nest` server binary: the JSON error
//! type, request extractors, request tracing middleware and the handlers
//! every deployment mounts (liveness and fallbacks).
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use nest_web::{correlation_id_layer, handlers, trace_layer};
//!
//! let app = Router::new()
//!     .route("/health", get(handlers::liveness))
//!     .route(
//!         "/api/v1/events",
//!         get(list_events).fallback(handlers::method_not_allowed),
//!     )
//!     .fallback(handlers::not_found)
//!     .layer(trace_layer())
//!     .layer(correlation_id_layer());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{BearerToken, ClientIp, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer, trace_layer};

/// Result type for web handlers.
pub type WebResult<T> = Result<T, AppError>;

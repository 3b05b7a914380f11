//! # Nest Core
//!
//! Domain types, schema model and migration planner for the Nest backend.
//!
//! This crate has no I/O of its own. Storage lives behind traits
//! ([`migrator::MigrationBackend`], [`repository::EventRepository`],
//! [`repository::ChunkRepository`], [`repository::HealthMetricsStore`],
//! [`repository::ProjectStore`]) that
//! are implemented by `nest-postgres` and, for tests, by `nest-testing`.
//!
//! ## Modules
//!
//! - **model**: `Event`, `Chunk`, `ProjectHealthMetrics` and the bounded `HealthScore`
//! - **validation**: min/max value validators and their errors
//! - **schema**: in-memory project state and the operations that change it
//! - **migration**: migration definitions and the dependency graph
//! - **migrator**: plans and runs migrations against a backend
//! - **repository**: read-side storage traits and the admin chunk query
//!
//! ## Example
//!
//! ```
//! use nest_core::migration::{Migration, MigrationGraph, Operation};
//! use nest_core::schema::{FieldDef, ModelKey, Schema};
//!
//! let event = ModelKey::new("owasp", "Event");
//! let graph = MigrationGraph::new([Migration::new("owasp", "0001_initial").operation(
//!     Operation::CreateModel {
//!         model: event.clone(),
//!         fields: vec![
//!             ("id".into(), FieldDef::primary_key()),
//!             ("name".into(), FieldDef::text()),
//!         ],
//!     },
//! )])?;
//!
//! let mut schema = Schema::new();
//! for migration in graph.ordered() {
//!     for operation in &migration.operations {
//!         schema.apply(operation)?;
//!     }
//! }
//! assert!(schema.has_field(&event, "name"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod migration;
pub mod migrator;
pub mod model;
pub mod repository;
pub mod schema;
pub mod validation;

pub use migration::{Migration, MigrationError, MigrationGraph, MigrationId, MigrationTarget, Operation};
pub use migrator::{MigrationBackend, Migrator};
pub use model::{
    Chunk, ChunkId, Event, EventId, HealthMetricsId, HealthScore, ProjectHealthMetrics, ProjectId,
    RepositoryId,
};
pub use schema::{FieldDef, FieldKind, ModelKey, Schema, SchemaError};
pub use validation::{ValidationError, Validator};

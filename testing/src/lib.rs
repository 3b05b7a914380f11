//! # Nest Testing
//!
//! In-memory backends and fixtures for testing the Nest backend without a
//! database.
//!
//! This crate provides:
//! - [`InMemoryMigrationBackend`]: schema, applied log and stored float
//!   columns, with atomic batches and failure injection
//! - [`InMemoryEventRepository`], [`InMemoryChunkRepository`] and
//!   [`InMemoryHealthMetricsStore`], [`InMemoryProjectStore`]: `BTreeMap`-backed
//!   repositories
//! - [`fixtures`]: sample records
//!
//! ## Example
//!
//! ```
//! use nest_core::migration::{Migration, MigrationGraph, MigrationTarget, Operation};
//! use nest_core::migrator::Migrator;
//! use nest_core::schema::{FieldDef, ModelKey};
//! use nest_testing::InMemoryMigrationBackend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = MigrationGraph::new([Migration::new("ai", "0001_initial").operation(
//!     Operation::CreateModel {
//!         model: ModelKey::new("ai", "chunk"),
//!         fields: vec![("id".into(), FieldDef::primary_key())],
//!     },
//! )])?;
//!
//! let migrator = Migrator::new(graph, InMemoryMigrationBackend::new());
//! let report = migrator.migrate(&MigrationTarget::All).await?;
//! assert_eq!(report.applied.len(), 1);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

pub mod fixtures;
mod migration_backend;
mod repositories;

pub use migration_backend::InMemoryMigrationBackend;
pub use repositories::{
    InMemoryChunkRepository, InMemoryEventRepository, InMemoryHealthMetricsStore,
    InMemoryProjectStore,
};

/// Install a test-writer subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

//! `PostgreSQL` storage for the Nest backend.
//!
//! This crate implements the storage traits from `nest-core` on top of sqlx:
//!
//! - [`PostgresMigrationBackend`]: transactional DDL plus the
//!   `schema_migrations` log, serialised with an advisory lock
//! - [`PostgresEventRepository`]: read-only access to `owasp_event`
//! - [`PostgresChunkRepository`]: `ILIKE` search over `ai_chunk`
//! - [`PostgresHealthMetricsStore`]: bounded scores in `owasp_projecthealthmetrics`
//! - [`PostgresProjectStore`]: project repositories through the many-to-many
//!   join table
//!
//! # Example
//!
//! ```no_run
//! use nest_postgres::{PoolConfig, PostgresEventRepository, connect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/nest", &PoolConfig::default()).await?;
//! let events = PostgresEventRepository::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ddl;
mod migration_backend;
mod pool;
mod repositories;

pub use migration_backend::PostgresMigrationBackend;
pub use pool::{PoolConfig, connect};
pub use repositories::{
    PostgresChunkRepository, PostgresEventRepository, PostgresHealthMetricsStore,
    PostgresProjectStore,
};
pub use sqlx::PgPool;

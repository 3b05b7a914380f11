//! `PostgreSQL` implementation of [`MigrationBackend`].
//!
//! Each batch runs in a single transaction. Postgres DDL is transactional, so
//! a failure anywhere rolls back both the schema changes and the log rows.
//! A transaction-scoped advisory lock keeps concurrent migrators from
//! interleaving.

use crate::ddl;
use chrono::{DateTime, Utc};
use nest_core::migration::{MigrationError, MigrationId};
use nest_core::migrator::{AppliedMigration, Direction, MigrationBackend, PlannedMigration};
use sqlx::{PgPool, Postgres, Transaction};

/// Advisory lock key held for the duration of a batch.
const MIGRATION_LOCK_KEY: i64 = 0x6e65_7374_6d69_67;

fn storage(error: sqlx::Error) -> MigrationError {
    MigrationError::Storage(error.to_string())
}

fn parse_dependency(raw: &str) -> Result<MigrationId, MigrationError> {
    raw.split_once('.')
        .map(|(app, name)| MigrationId::new(app, name))
        .ok_or_else(|| MigrationError::Storage(format!("Malformed dependency in log: {raw}")))
}

/// Migration backend storing its log in `schema_migrations`.
///
/// # Example
///
/// ```no_run
/// use nest_core::migration::{MigrationGraph, MigrationTarget};
/// use nest_core::migrator::Migrator;
/// use nest_postgres::PostgresMigrationBackend;
///
/// # async fn example(pool: sqlx::PgPool, graph: MigrationGraph) -> Result<(), Box<dyn std::error::Error>> {
/// let migrator = Migrator::new(graph, PostgresMigrationBackend::new(pool));
/// let report = migrator.migrate(&MigrationTarget::All).await?;
/// println!("Applied {} migration(s)", report.applied.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresMigrationBackend {
    pool: PgPool,
}

impl PostgresMigrationBackend {
    /// Create a backend over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction holding the migration lock, with the log table in place.
    ///
    /// `CREATE TABLE IF NOT EXISTS` is not safe against a concurrent create,
    /// so it only ever runs under the lock.
    async fn locked_transaction(&self) -> Result<Transaction<'static, Postgres>, MigrationError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        sqlx::query(ddl::CREATE_LOG_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        Ok(tx)
    }

    async fn run_step(
        tx: &mut Transaction<'static, Postgres>,
        step: &PlannedMigration,
    ) -> Result<(), MigrationError> {
        if step.direction == Direction::Forwards {
            let already: Option<i32> =
                sqlx::query_scalar("SELECT 1 FROM schema_migrations WHERE app = $1 AND name = $2")
                    .bind(&step.id.app)
                    .bind(&step.id.name)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(storage)?;
            if already.is_some() {
                return Err(MigrationError::Storage(format!(
                    "Migration {} was applied concurrently",
                    step.id
                )));
            }
        }

        for operation in &step.operations {
            if let Some(check) = ddl::bound_check(operation) {
                let count: i64 = sqlx::query_scalar(&check.sql)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(storage)?;
                if count > 0 {
                    return Err(MigrationError::BoundViolation {
                        model: check.model,
                        field: check.field,
                        min: check.min,
                        max: check.max,
                        count,
                    });
                }
            }

            for statement in ddl::statements(operation)? {
                tracing::debug!(migration = %step.id, sql = %statement, "Executing DDL");
                sqlx::query(&statement)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| {
                        MigrationError::Storage(format!("{} failed on '{operation}': {e}", step.id))
                    })?;
            }
        }

        match step.direction {
            Direction::Forwards => {
                let dependencies: Vec<String> =
                    step.dependencies.iter().map(ToString::to_string).collect();
                sqlx::query(
                    "INSERT INTO schema_migrations (app, name, dependencies) VALUES ($1, $2, $3)",
                )
                .bind(&step.id.app)
                .bind(&step.id.name)
                .bind(&dependencies)
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
            }
            Direction::Backwards => {
                sqlx::query("DELETE FROM schema_migrations WHERE app = $1 AND name = $2")
                    .bind(&step.id.app)
                    .bind(&step.id.name)
                    .execute(&mut **tx)
                    .await
                    .map_err(storage)?;
            }
        }

        Ok(())
    }
}

impl MigrationBackend for PostgresMigrationBackend {
    async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        let mut tx = self.locked_transaction().await?;

        let rows: Vec<(String, String, Vec<String>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT app, name, dependencies, applied_at FROM schema_migrations ORDER BY applied_at, app, name",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        rows.into_iter()
            .map(|(app, name, dependencies, applied_at)| {
                Ok(AppliedMigration {
                    id: MigrationId::new(app, name),
                    dependencies: dependencies
                        .iter()
                        .map(|raw| parse_dependency(raw))
                        .collect::<Result<_, _>>()?,
                    applied_at,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, batch), fields(steps = batch.len()))]
    async fn apply_batch(&self, batch: &[PlannedMigration]) -> Result<(), MigrationError> {
        let mut tx = self.locked_transaction().await?;

        for step in batch {
            // Dropping `tx` on the error path rolls the whole batch back.
            Self::run_step(&mut tx, step).await?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}

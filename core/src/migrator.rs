//! Applies migration plans against a storage backend.
//!
//! # Overview
//!
//! The [`Migrator`] owns a validated [`MigrationGraph`] and a
//! [`MigrationBackend`]. Every run follows the same steps:
//!
//! 1. Read the applied-migrations log from the backend.
//! 2. Replay the applied migrations onto an empty [`Schema`] ("project state").
//! 3. Plan the pending steps and check every operation's precondition
//!    against the replayed schema. Nothing touches storage if a check fails.
//! 4. Hand the whole batch to [`MigrationBackend::apply_batch`], which must
//!    apply it atomically: either every step and log entry lands, or none.
//!
//! ```text
//! ┌──────────────┐  applied()   ┌──────────┐  plan   ┌─────────────────────┐
//! │   Backend    │ ───────────▶ │ Migrator │ ──────▶ │ Vec<PlannedMigration>│
//! │ (log + DDL)  │ ◀─────────── │          │         └─────────────────────┘
//! └──────────────┘ apply_batch  └──────────┘
//! ```

use crate::migration::{Migration, MigrationError, MigrationGraph, MigrationId, MigrationTarget};
use crate::schema::{AppliedOperation, Schema};
use crate::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

/// A row of the applied-migrations log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Migration identity
    pub id: MigrationId,
    /// Dependencies as recorded when it was applied
    pub dependencies: Vec<MigrationId>,
    /// When it was applied
    pub applied_at: DateTime<Utc>,
}

/// Whether a planned step applies or unapplies its migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply operations, then record the migration.
    Forwards,
    /// Apply reversed operations, then delete the log entry.
    Backwards,
}

impl Direction {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forwards => "forwards",
            Self::Backwards => "backwards",
        }
    }
}

/// One step of a plan, with its operations already checked against the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMigration {
    /// Migration identity
    pub id: MigrationId,
    /// Declared dependencies, recorded in the log on forwards steps
    pub dependencies: Vec<MigrationId>,
    /// Forwards or backwards
    pub direction: Direction,
    /// Operations in execution order
    pub operations: Vec<AppliedOperation>,
}

/// The result of planning: the steps plus the schema they lead to.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Steps in execution order
    pub steps: Vec<PlannedMigration>,
    /// Schema after every step has run
    pub schema: Schema,
}

impl MigrationPlan {
    /// Whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What a [`Migrator::migrate`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Migrations applied, in order
    pub applied: Vec<MigrationId>,
    /// Migrations unapplied, in order
    pub unapplied: Vec<MigrationId>,
}

impl MigrationReport {
    /// Whether the run changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.unapplied.is_empty()
    }
}

/// Status line for one registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration identity
    pub id: MigrationId,
    /// When it was applied, `None` if pending
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    /// Whether the migration is applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Storage side of the migrator: the applied log and the DDL executor.
///
/// # Atomicity
///
/// `apply_batch` must be all-or-nothing. A failure part-way through must leave
/// both the schema and the log exactly as they were before the call.
pub trait MigrationBackend: Send + Sync {
    /// Read the applied-migrations log.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Storage`] if the log cannot be read.
    fn applied(&self) -> impl Future<Output = Result<Vec<AppliedMigration>, MigrationError>> + Send;

    /// Execute every step and update the log atomically.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Storage`] or [`MigrationError::BoundViolation`];
    /// the backend is unchanged in either case.
    fn apply_batch(
        &self,
        batch: &[PlannedMigration],
    ) -> impl Future<Output = Result<(), MigrationError>> + Send;
}

/// Replayed view of the applied log.
struct History {
    applied: BTreeMap<MigrationId, AppliedMigration>,
    schema: Schema,
    operations: BTreeMap<MigrationId, Vec<AppliedOperation>>,
}

/// Plans and runs migrations.
#[derive(Debug)]
pub struct Migrator<B> {
    graph: MigrationGraph,
    backend: B,
}

impl<B: MigrationBackend> Migrator<B> {
    /// Create a migrator.
    #[must_use]
    pub const fn new(graph: MigrationGraph, backend: B) -> Self {
        Self { graph, backend }
    }

    /// The registered migrations.
    #[must_use]
    pub const fn graph(&self) -> &MigrationGraph {
        &self.graph
    }

    /// The storage backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Schema implied by the applied migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or does not replay.
    pub async fn project_state(&self) -> Result<Schema, MigrationError> {
        Ok(self.history().await?.schema)
    }

    /// Every registered migration, in order, with its applied timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Storage`] if the log cannot be read.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>, MigrationError> {
        let applied: BTreeMap<MigrationId, DateTime<Utc>> = self
            .backend
            .applied()
            .await?
            .into_iter()
            .map(|row| (row.id, row.applied_at))
            .collect();

        Ok(self
            .graph
            .ordered()
            .map(|migration| MigrationStatus {
                id: migration.id.clone(),
                applied_at: applied.get(&migration.id).copied(),
            })
            .collect())
    }

    /// Compute the steps needed to reach `target` without touching storage.
    ///
    /// A [`MigrationTarget::To`] pointing at an applied migration plans
    /// backwards; every other target plans forwards except
    /// [`MigrationTarget::Zero`].
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::PreconditionFailed`] if any pending operation
    /// does not apply to the replayed schema, or a replay/history error.
    pub async fn plan(&self, target: &MigrationTarget) -> Result<MigrationPlan, MigrationError> {
        let History {
            applied,
            mut schema,
            operations,
        } = self.history().await?;
        let applied: BTreeSet<MigrationId> = applied.into_keys().collect();

        let backwards = match target {
            MigrationTarget::Zero(_) => true,
            MigrationTarget::To(id) => applied.contains(id),
            MigrationTarget::All | MigrationTarget::App(_) => false,
        };

        let steps = if backwards {
            self.graph
                .backwards_plan(&applied, target)?
                .into_iter()
                .map(|migration| unapply(&mut schema, migration, &operations))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            self.graph
                .forwards_plan(&applied, target)?
                .into_iter()
                .map(|migration| apply(&mut schema, migration))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(MigrationPlan { steps, schema })
    }

    /// Plan and execute in one atomic batch.
    ///
    /// Running twice with the same target is a no-op the second time.
    ///
    /// # Errors
    ///
    /// Returns any planning error, or the backend's error. In both cases
    /// storage is left unchanged.
    pub async fn migrate(&self, target: &MigrationTarget) -> Result<MigrationReport, MigrationError> {
        let plan = self.plan(target).await?;
        if plan.is_empty() {
            tracing::info!("No migrations to apply");
            return Ok(MigrationReport::default());
        }

        for step in &plan.steps {
            tracing::info!(
                migration = %step.id,
                direction = step.direction.as_str(),
                operations = step.operations.len(),
                "Planned migration"
            );
            for operation in step.operations.iter().filter(|op| op.drops_relation()) {
                tracing::warn!(
                    migration = %step.id,
                    operation = %operation,
                    "Dropping relation; existing links are discarded"
                );
            }
        }

        if let Err(error) = self.backend.apply_batch(&plan.steps).await {
            tracing::error!(error = %error, "Migration batch rolled back");
            metrics::counter!("migrations.failed").increment(1);
            return Err(error);
        }

        let mut report = MigrationReport::default();
        for step in plan.steps {
            metrics::counter!("migrations.applied", "direction" => step.direction.as_str())
                .increment(1);
            match step.direction {
                Direction::Forwards => {
                    tracing::info!(migration = %step.id, "Applied migration");
                    report.applied.push(step.id);
                }
                Direction::Backwards => {
                    tracing::info!(migration = %step.id, "Unapplied migration");
                    report.unapplied.push(step.id);
                }
            }
        }

        Ok(report)
    }

    async fn history(&self) -> Result<History, MigrationError> {
        let mut applied = BTreeMap::new();
        for row in self.backend.applied().await? {
            if self.graph.contains(&row.id) {
                applied.insert(row.id.clone(), row);
            } else {
                tracing::warn!(migration = %row.id, "Applied migration is not registered; ignoring");
            }
        }

        for id in applied.keys() {
            if let Some(migration) = self.graph.get(id) {
                if let Some(missing) = migration
                    .dependencies
                    .iter()
                    .find(|dependency| !applied.contains_key(*dependency))
                {
                    return Err(MigrationError::InconsistentHistory {
                        migration: id.clone(),
                        dependency: missing.clone(),
                    });
                }
            }
        }

        let mut schema = Schema::new();
        let mut operations = BTreeMap::new();
        for migration in self.graph.ordered().filter(|m| applied.contains_key(&m.id)) {
            let mut done = Vec::with_capacity(migration.operations.len());
            for operation in &migration.operations {
                let applied_op =
                    schema
                        .apply(operation)
                        .map_err(|source| MigrationError::ReplayFailed {
                            migration: migration.id.clone(),
                            source,
                        })?;
                done.push(applied_op);
            }
            operations.insert(migration.id.clone(), done);
        }

        Ok(History {
            applied,
            schema,
            operations,
        })
    }
}

fn apply(schema: &mut Schema, migration: &Migration) -> Result<PlannedMigration, MigrationError> {
    let operations = migration
        .operations
        .iter()
        .map(|operation| {
            schema
                .apply(operation)
                .map_err(|source| MigrationError::PreconditionFailed {
                    migration: migration.id.clone(),
                    operation: operation.to_string(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PlannedMigration {
        id: migration.id.clone(),
        dependencies: migration.dependencies.clone(),
        direction: Direction::Forwards,
        operations,
    })
}

fn unapply(
    schema: &mut Schema,
    migration: &Migration,
    history: &BTreeMap<MigrationId, Vec<AppliedOperation>>,
) -> Result<PlannedMigration, MigrationError> {
    let recorded = history.get(&migration.id).map_or(&[][..], Vec::as_slice);

    let operations = recorded
        .iter()
        .rev()
        .map(|applied| {
            schema
                .revert(applied)
                .map_err(|source| MigrationError::PreconditionFailed {
                    migration: migration.id.clone(),
                    operation: applied.reverse().to_string(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PlannedMigration {
        id: migration.id.clone(),
        dependencies: migration.dependencies.clone(),
        direction: Direction::Backwards,
        operations,
    })
}

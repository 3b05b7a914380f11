//! In-memory [`MigrationBackend`].
//!
//! Holds the live schema, the applied log and the stored values of float
//! columns. Batches work on a copy that replaces the live state only when
//! every step succeeded, which gives the same all-or-nothing behaviour as a
//! database transaction.

use chrono::Utc;
use nest_core::migration::{MigrationError, MigrationId};
use nest_core::migrator::{AppliedMigration, Direction, MigrationBackend, PlannedMigration};
use nest_core::schema::{AppliedOperation, FieldKind, ModelKey, Schema, SchemaError};
use nest_core::validation::bounds;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type Column = (ModelKey, String);

#[derive(Clone, Debug, Default)]
struct State {
    schema: Schema,
    log: Vec<AppliedMigration>,
    floats: BTreeMap<Column, Vec<Option<f64>>>,
    fail_on: Option<MigrationId>,
    committed_batches: usize,
}

impl State {
    fn apply(&mut self, operation: &AppliedOperation) -> Result<(), MigrationError> {
        self.schema
            .replay(operation)
            .map_err(|e| MigrationError::Storage(e.to_string()))?;

        match operation {
            AppliedOperation::AlterField {
                model, name, field, ..
            } if field.kind == FieldKind::Float => {
                let values = self
                    .floats
                    .get(&(model.clone(), name.clone()))
                    .map_or(&[][..], Vec::as_slice);

                if !field.null && values.iter().any(Option::is_none) {
                    return Err(MigrationError::Storage(format!(
                        "column {name} of {model} contains null values"
                    )));
                }

                let (min, max) = bounds(&field.validators);
                let min = min.unwrap_or(f64::NEG_INFINITY);
                let max = max.unwrap_or(f64::INFINITY);
                let count = values
                    .iter()
                    .flatten()
                    .filter(|value| !(min..=max).contains(*value))
                    .count();
                if count > 0 {
                    return Err(MigrationError::BoundViolation {
                        model: model.clone(),
                        field: name.clone(),
                        min,
                        max,
                        count: i64::try_from(count).unwrap_or(i64::MAX),
                    });
                }
            }
            AppliedOperation::RemoveField { model, name, .. } => {
                self.floats.remove(&(model.clone(), name.clone()));
            }
            AppliedOperation::RenameField {
                model,
                old_name,
                new_name,
                ..
            } => {
                if let Some(values) = self.floats.remove(&(model.clone(), old_name.clone())) {
                    self.floats.insert((model.clone(), new_name.clone()), values);
                }
            }
            AppliedOperation::DeleteModel { model } => {
                self.floats.retain(|(key, _), _| key != &model.key);
            }
            _ => {}
        }
        Ok(())
    }
}

/// In-memory migration backend with failure injection.
///
/// # Example
///
/// ```
/// use nest_core::migration::MigrationId;
/// use nest_testing::InMemoryMigrationBackend;
///
/// let backend = InMemoryMigrationBackend::new();
/// backend.fail_on(MigrationId::new("owasp", "0036_score"));
/// assert!(backend.applied_ids().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryMigrationBackend {
    state: Arc<RwLock<State>>,
}

impl InMemoryMigrationBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any batch after the operations of `id` ran but before it is logged
    pub fn fail_on(&self, id: MigrationId) {
        self.state.write().unwrap().fail_on = Some(id);
    }

    /// Stop injecting failures
    pub fn clear_failure(&self) {
        self.state.write().unwrap().fail_on = None;
    }

    /// Live schema
    #[must_use]
    pub fn schema(&self) -> Schema {
        self.state.read().unwrap().schema.clone()
    }

    /// Applied migration ids in log order
    #[must_use]
    pub fn applied_ids(&self) -> Vec<MigrationId> {
        self.state
            .read()
            .unwrap()
            .log
            .iter()
            .map(|row| row.id.clone())
            .collect()
    }

    /// Number of batches that committed
    #[must_use]
    pub fn committed_batches(&self) -> usize {
        self.state.read().unwrap().committed_batches
    }

    /// Store raw values without validation, as pre-existing rows would be
    pub fn seed_floats(&self, model: &ModelKey, field: &str, values: impl IntoIterator<Item = Option<f64>>) {
        self.state
            .write()
            .unwrap()
            .floats
            .entry((model.clone(), field.to_string()))
            .or_default()
            .extend(values);
    }

    /// Write one value through the live schema's validators
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the field is unknown, not a float, or the
    /// value is rejected.
    pub fn write_float(&self, model: &ModelKey, field: &str, value: Option<f64>) -> Result<(), SchemaError> {
        let mut state = self.state.write().unwrap();
        state.schema.validate_float(model, field, value)?;
        state
            .floats
            .entry((model.clone(), field.to_string()))
            .or_default()
            .push(value);
        Ok(())
    }

    /// Stored values of a float column
    #[must_use]
    pub fn floats(&self, model: &ModelKey, field: &str) -> Vec<Option<f64>> {
        self.state
            .read()
            .unwrap()
            .floats
            .get(&(model.clone(), field.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

impl MigrationBackend for InMemoryMigrationBackend {
    async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        Ok(self.state.read().unwrap().log.clone())
    }

    async fn apply_batch(&self, batch: &[PlannedMigration]) -> Result<(), MigrationError> {
        let mut live = self.state.write().unwrap();
        let mut next = live.clone();

        for step in batch {
            for operation in &step.operations {
                next.apply(operation)?;
            }

            if next.fail_on.as_ref() == Some(&step.id) {
                return Err(MigrationError::Storage(format!(
                    "injected failure while applying {}",
                    step.id
                )));
            }

            match step.direction {
                Direction::Forwards => next.log.push(AppliedMigration {
                    id: step.id.clone(),
                    dependencies: step.dependencies.clone(),
                    applied_at: Utc::now(),
                }),
                Direction::Backwards => next.log.retain(|row| row.id != step.id),
            }
        }

        next.committed_batches += 1;
        *live = next;
        Ok(())
    }
}

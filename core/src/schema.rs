//! In-memory model of the relational schema ("project state").
//!
//! The migrator never introspects the live database. It replays the applied
//! migrations onto an empty [`Schema`] and uses the result to check the
//! preconditions of pending operations before any DDL runs.
//!
//! ```text
//! applied log ──replay──▶ Schema ──apply(op)──▶ AppliedOperation ──▶ backend DDL
//!                                                     │
//!                                                     └── revert() ──▶ AppliedOperation
//! ```

use crate::migration::Operation;
use crate::validation::{ValidationError, Validator};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Identifies a model within an app, e.g. `owasp.project`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelKey {
    /// App namespace (`owasp`, `github`, `ai`)
    pub app: String,
    /// Lowercase model name
    pub model: String,
}

impl ModelKey {
    /// Build a key; the model name is lowercased.
    #[must_use]
    pub fn new(app: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            model: model.into().to_lowercase(),
        }
    }

    /// Backing table name, `{app}_{model}`.
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.app, self.model)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.model)
    }
}

/// Storage type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// 64-bit auto-incrementing primary key
    BigAutoPk,
    /// Unbounded text
    Text,
    /// URL stored as text
    Url,
    /// 64-bit integer
    Integer,
    /// Double precision float
    Float,
    /// Timestamp with time zone
    DateTime {
        /// Set once by the store on insert
        auto_now_add: bool,
        /// Refreshed by the store on every write
        auto_now: bool,
    },
    /// Many-to-one reference stored as `{field}_id`
    ForeignKey {
        /// Referenced model
        to: ModelKey,
    },
    /// Many-to-many relation stored in a join table
    ManyToMany {
        /// Related model
        to: ModelKey,
    },
}

impl FieldKind {
    /// Whether the field references another model.
    #[must_use]
    pub const fn is_relation(&self) -> bool {
        matches!(self, Self::ForeignKey { .. } | Self::ManyToMany { .. })
    }

    /// Whether the field lives in a join table instead of a column.
    #[must_use]
    pub const fn is_many_to_many(&self) -> bool {
        matches!(self, Self::ManyToMany { .. })
    }

    /// Model on the other side of a relation.
    #[must_use]
    pub const fn related_model(&self) -> Option<&ModelKey> {
        match self {
            Self::ForeignKey { to } | Self::ManyToMany { to } => Some(to),
            _ => None,
        }
    }
}

/// Field definition as declared by a migration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Storage type
    pub kind: FieldKind,
    /// Whether `NULL` is a valid value
    pub null: bool,
    /// Operator-facing description
    pub help_text: Option<String>,
    /// Human readable name
    pub verbose_name: Option<String>,
    /// Application-side validators
    pub validators: Vec<Validator>,
}

impl FieldDef {
    /// Non-null field of the given kind, no validators.
    #[must_use]
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            null: false,
            help_text: None,
            verbose_name: None,
            validators: Vec::new(),
        }
    }

    /// Auto-incrementing `id` primary key.
    #[must_use]
    pub const fn primary_key() -> Self {
        Self::new(FieldKind::BigAutoPk)
    }

    /// Text field.
    #[must_use]
    pub const fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    /// URL field.
    #[must_use]
    pub const fn url() -> Self {
        Self::new(FieldKind::Url)
    }

    /// Integer field.
    #[must_use]
    pub const fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    /// Float field.
    #[must_use]
    pub const fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    /// Creation timestamp assigned by the store.
    #[must_use]
    pub const fn created_at() -> Self {
        Self::new(FieldKind::DateTime {
            auto_now_add: true,
            auto_now: false,
        })
    }

    /// Modification timestamp assigned by the store.
    #[must_use]
    pub const fn updated_at() -> Self {
        Self::new(FieldKind::DateTime {
            auto_now_add: false,
            auto_now: true,
        })
    }

    /// Foreign key to `to`.
    #[must_use]
    pub const fn foreign_key(to: ModelKey) -> Self {
        Self::new(FieldKind::ForeignKey { to })
    }

    /// Many-to-many relation to `to`.
    #[must_use]
    pub const fn many_to_many(to: ModelKey) -> Self {
        Self::new(FieldKind::ManyToMany { to })
    }

    /// Allow `NULL`.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Attach a help text.
    #[must_use]
    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = Some(help_text.into());
        self
    }

    /// Attach a verbose name.
    #[must_use]
    pub fn with_verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = Some(verbose_name.into());
        self
    }

    /// Append validators.
    #[must_use]
    pub fn with_validators(mut self, validators: impl IntoIterator<Item = Validator>) -> Self {
        self.validators.extend(validators);
        self
    }

    /// Validate a float value against nullability and validators.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] on null for a non-null field or a failing validator.
    pub fn validate_float(&self, value: Option<f64>) -> Result<(), ValidationError> {
        match value {
            None if self.null => Ok(()),
            None => Err(ValidationError::Null),
            Some(value) => self
                .validators
                .iter()
                .try_for_each(|validator| validator.check(value)),
        }
    }
}

/// State of a single model: its fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    /// Model identity
    pub key: ModelKey,
    /// Fields in declaration order
    pub fields: Vec<(String, FieldDef)>,
}

impl ModelState {
    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(field_name, _)| field_name == name)
    }
}

/// Schema-level failure: a lookup or a precondition did not hold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// No such model.
    #[error("Model {0} does not exist")]
    UnknownModel(ModelKey),

    /// Model created twice.
    #[error("Model {0} already exists")]
    ModelExists(ModelKey),

    /// No such field on the model.
    #[error("{model} has no field named '{field}'")]
    UnknownField {
        /// Model searched
        model: ModelKey,
        /// Missing field
        field: String,
    },

    /// Field added twice.
    #[error("{model} already has a field named '{field}'")]
    FieldExists {
        /// Model modified
        model: ModelKey,
        /// Clashing field
        field: String,
    },

    /// Relation points at a model that does not exist.
    #[error("{model}.{field} references unknown model {target}")]
    UnknownRelationTarget {
        /// Model declaring the relation
        model: ModelKey,
        /// Relation field
        field: String,
        /// Missing target
        target: ModelKey,
    },

    /// Model still referenced by another model's relation.
    #[error("{model} is still referenced by {referrer}.{field}")]
    StillReferenced {
        /// Model being deleted
        model: ModelKey,
        /// Referencing model
        referrer: ModelKey,
        /// Referencing field
        field: String,
    },

    /// Field is not of the kind the caller expected.
    #[error("{model}.{field} is not a {expected} field")]
    WrongKind {
        /// Model
        model: ModelKey,
        /// Field
        field: String,
        /// Expected kind
        expected: &'static str,
    },

    /// Value rejected by the field's validators.
    #[error("Invalid value for {model}.{field}: {source}")]
    Validation {
        /// Model
        model: ModelKey,
        /// Field
        field: String,
        /// Validator failure
        #[source]
        source: ValidationError,
    },
}

/// An operation that has been applied to a [`Schema`], with the state it replaced.
///
/// Backends translate these into DDL. Keeping the prior definition makes every
/// step reversible without consulting the database.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedOperation {
    /// A model was created.
    CreateModel {
        /// The created model
        model: ModelState,
    },
    /// A model was deleted.
    DeleteModel {
        /// The model as it was before deletion
        model: ModelState,
    },
    /// A field was added.
    AddField {
        /// Model
        model: ModelKey,
        /// Field name
        name: String,
        /// New definition
        field: FieldDef,
        /// Position of the field among the model's fields
        index: usize,
    },
    /// A field was removed.
    RemoveField {
        /// Model
        model: ModelKey,
        /// Field name
        name: String,
        /// Definition before removal
        previous: FieldDef,
        /// Position the field held among the model's fields
        index: usize,
    },
    /// A field definition changed.
    AlterField {
        /// Model
        model: ModelKey,
        /// Field name
        name: String,
        /// Definition before the change
        previous: FieldDef,
        /// Definition after the change
        field: FieldDef,
    },
    /// A field was renamed.
    RenameField {
        /// Model
        model: ModelKey,
        /// Name before
        old_name: String,
        /// Name after
        new_name: String,
        /// Unchanged definition
        field: FieldDef,
    },
}

impl AppliedOperation {
    /// The operation that undoes this one.
    #[must_use]
    pub fn reverse(&self) -> Operation {
        match self {
            Self::CreateModel { model } => Operation::DeleteModel {
                model: model.key.clone(),
            },
            Self::DeleteModel { model } => Operation::CreateModel {
                model: model.key.clone(),
                fields: model.fields.clone(),
            },
            Self::AddField { model, name, .. } => Operation::RemoveField {
                model: model.clone(),
                name: name.clone(),
            },
            Self::RemoveField {
                model,
                name,
                previous,
                ..
            } => Operation::AddField {
                model: model.clone(),
                name: name.clone(),
                field: previous.clone(),
            },
            Self::AlterField {
                model,
                name,
                previous,
                ..
            } => Operation::AlterField {
                model: model.clone(),
                name: name.clone(),
                field: previous.clone(),
            },
            Self::RenameField {
                model,
                old_name,
                new_name,
                ..
            } => Operation::RenameField {
                model: model.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },
        }
    }

    /// The operation this was produced from.
    #[must_use]
    pub fn forward(&self) -> Operation {
        match self {
            Self::CreateModel { model } => Operation::CreateModel {
                model: model.key.clone(),
                fields: model.fields.clone(),
            },
            Self::DeleteModel { model } => Operation::DeleteModel {
                model: model.key.clone(),
            },
            Self::AddField {
                model, name, field, ..
            } => Operation::AddField {
                model: model.clone(),
                name: name.clone(),
                field: field.clone(),
            },
            Self::RemoveField { model, name, .. } => Operation::RemoveField {
                model: model.clone(),
                name: name.clone(),
            },
            Self::AlterField {
                model, name, field, ..
            } => Operation::AlterField {
                model: model.clone(),
                name: name.clone(),
                field: field.clone(),
            },
            Self::RenameField {
                model,
                old_name,
                new_name,
                ..
            } => Operation::RenameField {
                model: model.clone(),
                old_name: old_name.clone(),
                new_name: new_name.clone(),
            },
        }
    }

    /// Model touched by the operation.
    #[must_use]
    pub const fn model(&self) -> &ModelKey {
        match self {
            Self::CreateModel { model } | Self::DeleteModel { model } => &model.key,
            Self::AddField { model, .. }
            | Self::RemoveField { model, .. }
            | Self::AlterField { model, .. }
            | Self::RenameField { model, .. } => model,
        }
    }

    /// Whether applying this operation discards stored relation data.
    #[must_use]
    pub const fn drops_relation(&self) -> bool {
        match self {
            Self::RemoveField { previous, .. } => previous.kind.is_relation(),
            _ => false,
        }
    }
}

impl fmt::Display for AppliedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateModel { model } => write!(f, "Create model {}", model.key),
            Self::DeleteModel { model } => write!(f, "Delete model {}", model.key),
            Self::AddField { model, name, .. } => write!(f, "Add field {name} to {model}"),
            Self::RemoveField { model, name, .. } => {
                write!(f, "Remove field {name} from {model}")
            }
            Self::AlterField { model, name, .. } => write!(f, "Alter field {name} on {model}"),
            Self::RenameField {
                model,
                old_name,
                new_name,
                ..
            } => write!(f, "Rename field {old_name} on {model} to {new_name}"),
        }
    }
}

/// The project state: every model and its fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    models: BTreeMap<ModelKey, ModelState>,
}

impl Schema {
    /// Empty schema.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// All models, ordered by key.
    pub fn models(&self) -> impl Iterator<Item = &ModelState> {
        self.models.values()
    }

    /// Look up a model.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownModel`] if the model does not exist.
    pub fn model(&self, key: &ModelKey) -> Result<&ModelState, SchemaError> {
        self.models
            .get(key)
            .ok_or_else(|| SchemaError::UnknownModel(key.clone()))
    }

    /// Look up a field by name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownModel`] or [`SchemaError::UnknownField`].
    pub fn field(&self, key: &ModelKey, name: &str) -> Result<&FieldDef, SchemaError> {
        self.model(key)?
            .field(name)
            .ok_or_else(|| SchemaError::UnknownField {
                model: key.clone(),
                field: name.to_string(),
            })
    }

    /// Whether the field exists.
    #[must_use]
    pub fn has_field(&self, key: &ModelKey, name: &str) -> bool {
        self.field(key, name).is_ok()
    }

    /// Validate a value destined for a float field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::WrongKind`] for non-float fields and
    /// [`SchemaError::Validation`] when the value is rejected.
    pub fn validate_float(
        &self,
        key: &ModelKey,
        name: &str,
        value: Option<f64>,
    ) -> Result<(), SchemaError> {
        let field = self.field(key, name)?;
        if field.kind != FieldKind::Float {
            return Err(SchemaError::WrongKind {
                model: key.clone(),
                field: name.to_string(),
                expected: "float",
            });
        }

        field
            .validate_float(value)
            .map_err(|source| SchemaError::Validation {
                model: key.clone(),
                field: name.to_string(),
                source,
            })
    }

    /// Apply one operation, checking its preconditions.
    ///
    /// The schema is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] describing the failed precondition.
    pub fn apply(&mut self, operation: &Operation) -> Result<AppliedOperation, SchemaError> {
        match operation {
            Operation::CreateModel { model, fields } => {
                if self.models.contains_key(model) {
                    return Err(SchemaError::ModelExists(model.clone()));
                }

                let mut seen = BTreeSet::new();
                for (name, field) in fields {
                    if !seen.insert(name.as_str()) {
                        return Err(SchemaError::FieldExists {
                            model: model.clone(),
                            field: name.clone(),
                        });
                    }
                    self.check_relation_target(model, name, field)?;
                }

                let state = ModelState {
                    key: model.clone(),
                    fields: fields.clone(),
                };
                self.models.insert(model.clone(), state.clone());
                Ok(AppliedOperation::CreateModel { model: state })
            }
            Operation::DeleteModel { model } => {
                if let Some((referrer, field)) = self.first_referrer(model) {
                    return Err(SchemaError::StillReferenced {
                        model: model.clone(),
                        referrer,
                        field,
                    });
                }

                let previous = self
                    .models
                    .remove(model)
                    .ok_or_else(|| SchemaError::UnknownModel(model.clone()))?;
                Ok(AppliedOperation::DeleteModel { model: previous })
            }
            Operation::AddField { model, name, field } => {
                self.check_relation_target(model, name, field)?;
                let state = self.model_mut(model)?;
                if state.field(name).is_some() {
                    return Err(SchemaError::FieldExists {
                        model: model.clone(),
                        field: name.clone(),
                    });
                }

                state.fields.push((name.clone(), field.clone()));
                Ok(AppliedOperation::AddField {
                    model: model.clone(),
                    name: name.clone(),
                    field: field.clone(),
                    index: state.fields.len() - 1,
                })
            }
            Operation::RemoveField { model, name } => {
                let state = self.model_mut(model)?;
                let index = state.position(name).ok_or_else(|| SchemaError::UnknownField {
                    model: model.clone(),
                    field: name.clone(),
                })?;

                let (_, previous) = state.fields.remove(index);
                Ok(AppliedOperation::RemoveField {
                    model: model.clone(),
                    name: name.clone(),
                    previous,
                    index,
                })
            }
            Operation::AlterField { model, name, field } => {
                self.check_relation_target(model, name, field)?;
                let state = self.model_mut(model)?;
                let index = state.position(name).ok_or_else(|| SchemaError::UnknownField {
                    model: model.clone(),
                    field: name.clone(),
                })?;

                let previous = std::mem::replace(&mut state.fields[index].1, field.clone());
                Ok(AppliedOperation::AlterField {
                    model: model.clone(),
                    name: name.clone(),
                    previous,
                    field: field.clone(),
                })
            }
            Operation::RenameField {
                model,
                old_name,
                new_name,
            } => {
                let state = self.model_mut(model)?;
                if state.field(new_name).is_some() {
                    return Err(SchemaError::FieldExists {
                        model: model.clone(),
                        field: new_name.clone(),
                    });
                }
                let index = state.position(old_name).ok_or_else(|| SchemaError::UnknownField {
                    model: model.clone(),
                    field: old_name.clone(),
                })?;

                new_name.clone_into(&mut state.fields[index].0);
                Ok(AppliedOperation::RenameField {
                    model: model.clone(),
                    old_name: old_name.clone(),
                    new_name: new_name.clone(),
                    field: state.fields[index].1.clone(),
                })
            }
        }
    }

    /// Undo an operation previously returned by [`Schema::apply`].
    ///
    /// Applies [`AppliedOperation::reverse`] and puts a restored field back at
    /// the position it was removed from, so replaying the shorter history
    /// yields the same schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the inverse operation's preconditions fail.
    pub fn revert(&mut self, applied: &AppliedOperation) -> Result<AppliedOperation, SchemaError> {
        let mut undone = self.apply(&applied.reverse())?;
        if let (
            AppliedOperation::RemoveField { index, .. },
            AppliedOperation::AddField {
                model,
                name,
                index: placed,
                ..
            },
        ) = (applied, &mut undone)
        {
            *placed = self.place(model, name, *index)?;
        }
        Ok(undone)
    }

    /// Apply an operation recorded elsewhere, keeping its field position.
    ///
    /// Backends use this to mirror a planned step onto their own schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the operation's preconditions fail.
    pub fn replay(&mut self, applied: &AppliedOperation) -> Result<(), SchemaError> {
        self.apply(&applied.forward())?;
        if let AppliedOperation::AddField {
            model, name, index, ..
        } = applied
        {
            self.place(model, name, *index)?;
        }
        Ok(())
    }

    /// Move a field to `index`, clamped to the field count; returns where it landed.
    fn place(&mut self, model: &ModelKey, name: &str, index: usize) -> Result<usize, SchemaError> {
        let state = self.model_mut(model)?;
        let current = state.position(name).ok_or_else(|| SchemaError::UnknownField {
            model: model.clone(),
            field: name.to_string(),
        })?;
        let field = state.fields.remove(current);
        let index = index.min(state.fields.len());
        state.fields.insert(index, field);
        Ok(index)
    }

    fn model_mut(&mut self, key: &ModelKey) -> Result<&mut ModelState, SchemaError> {
        self.models
            .get_mut(key)
            .ok_or_else(|| SchemaError::UnknownModel(key.clone()))
    }

    fn check_relation_target(
        &self,
        model: &ModelKey,
        name: &str,
        field: &FieldDef,
    ) -> Result<(), SchemaError> {
        match field.kind.related_model() {
            Some(target) if target != model && !self.models.contains_key(target) => {
                Err(SchemaError::UnknownRelationTarget {
                    model: model.clone(),
                    field: name.to_string(),
                    target: target.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn first_referrer(&self, target: &ModelKey) -> Option<(ModelKey, String)> {
        self.models
            .values()
            .filter(|state| &state.key != target)
            .flat_map(|state| {
                state
                    .fields
                    .iter()
                    .map(move |(name, field)| (&state.key, name, field))
            })
            .find(|(_, _, field)| field.kind.related_model() == Some(target))
            .map(|(key, name, _)| (key.clone(), name.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn repository() -> ModelKey {
        ModelKey::new("github", "repository")
    }

    fn project() -> ModelKey {
        ModelKey::new("owasp", "project")
    }

    fn schema_with_project() -> Schema {
        let mut schema = Schema::new();
        schema
            .apply(&Operation::CreateModel {
                model: repository(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    ("name".into(), FieldDef::text()),
                ],
            })
            .unwrap();
        schema
            .apply(&Operation::CreateModel {
                model: project(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    (
                        "owasp_repository".into(),
                        FieldDef::foreign_key(repository()).nullable(),
                    ),
                ],
            })
            .unwrap();
        schema
    }

    #[test]
    fn test_model_key_lowercases_and_names_table() {
        let key = ModelKey::new("owasp", "ProjectHealthMetrics");
        assert_eq!(key.model, "projecthealthmetrics");
        assert_eq!(key.table_name(), "owasp_projecthealthmetrics");
        assert_eq!(key.to_string(), "owasp.projecthealthmetrics");
    }

    #[test]
    fn test_remove_then_add_relation() {
        let mut schema = schema_with_project();

        let removed = schema
            .apply(&Operation::RemoveField {
                model: project(),
                name: "owasp_repository".into(),
            })
            .unwrap();
        assert!(removed.drops_relation());

        schema
            .apply(&Operation::AddField {
                model: project(),
                name: "repositories".into(),
                field: FieldDef::many_to_many(repository()).with_verbose_name("Repositories"),
            })
            .unwrap();

        assert!(matches!(
            schema.field(&project(), "owasp_repository"),
            Err(SchemaError::UnknownField { .. })
        ));
        assert!(schema.field(&project(), "repositories").unwrap().kind.is_many_to_many());
    }

    #[test]
    fn test_remove_missing_field_fails_without_change() {
        let mut schema = schema_with_project();
        let before = schema.clone();

        let err = schema
            .apply(&Operation::RemoveField {
                model: project(),
                name: "leaders".into(),
            })
            .unwrap_err();

        assert!(matches!(err, SchemaError::UnknownField { .. }));
        assert_eq!(schema, before);
    }

    #[test]
    fn test_add_existing_field_fails() {
        let mut schema = schema_with_project();
        let err = schema
            .apply(&Operation::AddField {
                model: project(),
                name: "id".into(),
                field: FieldDef::integer(),
            })
            .unwrap_err();
        assert!(matches!(err, SchemaError::FieldExists { .. }));
    }

    #[test]
    fn test_relation_to_unknown_model_fails() {
        let mut schema = Schema::new();
        let err = schema
            .apply(&Operation::CreateModel {
                model: project(),
                fields: vec![("owasp_repository".into(), FieldDef::foreign_key(repository()))],
            })
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRelationTarget { .. }));
    }

    #[test]
    fn test_delete_referenced_model_fails() {
        let mut schema = schema_with_project();
        let err = schema
            .apply(&Operation::DeleteModel { model: repository() })
            .unwrap_err();
        assert!(matches!(err, SchemaError::StillReferenced { .. }));
    }

    #[test]
    fn test_reverse_restores_previous_state() {
        let mut schema = schema_with_project();
        let before = schema.clone();

        let operations = [
            Operation::RemoveField {
                model: project(),
                name: "owasp_repository".into(),
            },
            Operation::RenameField {
                model: project(),
                old_name: "id".into(),
                new_name: "pk".into(),
            },
        ];
        let applied: Vec<_> = operations
            .iter()
            .map(|op| schema.apply(op).unwrap())
            .collect();

        for op in applied.iter().rev() {
            schema.revert(op).unwrap();
        }

        assert_eq!(schema, before);
    }

    #[test]
    fn test_revert_puts_removed_field_back_in_place() {
        let mut schema = schema_with_project();
        schema
            .apply(&Operation::AddField {
                model: project(),
                name: "name".into(),
                field: FieldDef::text(),
            })
            .unwrap();
        let before = schema.clone();
        let mut mirror = schema.clone();

        let removed = schema
            .apply(&Operation::RemoveField {
                model: project(),
                name: "owasp_repository".into(),
            })
            .unwrap();
        mirror.replay(&removed).unwrap();

        let restored = schema.revert(&removed).unwrap();
        assert!(matches!(restored, AppliedOperation::AddField { index: 1, .. }));
        assert_eq!(schema, before);

        mirror.replay(&restored).unwrap();
        assert_eq!(mirror, before);
    }

    #[test]
    fn test_validate_float_respects_validators_and_null() {
        let metrics = ModelKey::new("owasp", "projecthealthmetrics");
        let mut schema = Schema::new();
        schema
            .apply(&Operation::CreateModel {
                model: metrics.clone(),
                fields: vec![(
                    "score".into(),
                    FieldDef::float()
                        .nullable()
                        .with_validators([Validator::MinValue(0.0), Validator::MaxValue(100.0)]),
                )],
            })
            .unwrap();

        assert!(schema.validate_float(&metrics, "score", Some(100.0)).is_ok());
        assert!(schema.validate_float(&metrics, "score", Some(0.0)).is_ok());
        assert!(schema.validate_float(&metrics, "score", None).is_ok());
        assert!(matches!(
            schema.validate_float(&metrics, "score", Some(150.0)),
            Err(SchemaError::Validation { .. })
        ));
    }
}

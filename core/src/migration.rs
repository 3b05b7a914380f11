//! Migration definitions and the dependency graph that orders them.
//!
//! A [`Migration`] is a named, app-scoped list of [`Operation`]s that declares
//! the migrations it depends on. The [`MigrationGraph`] validates the set
//! (no duplicates, no dangling dependencies, no cycles) and produces
//! deterministic forwards and backwards plans.
//!
//! # Example
//!
//! ```
//! use nest_core::migration::{Migration, MigrationGraph, MigrationTarget, Operation};
//! use nest_core::schema::{FieldDef, ModelKey};
//! use std::collections::BTreeSet;
//!
//! let chunk = ModelKey::new("ai", "chunk");
//! let graph = MigrationGraph::new([
//!     Migration::new("ai", "0001_initial").operation(Operation::CreateModel {
//!         model: chunk.clone(),
//!         fields: vec![("id".into(), FieldDef::primary_key())],
//!     }),
//!     Migration::new("ai", "0002_chunk_text")
//!         .depends_on("ai", "0001_initial")
//!         .operation(Operation::AddField {
//!             model: chunk,
//!             name: "text".into(),
//!             field: FieldDef::text(),
//!         }),
//! ])?;
//!
//! let plan = graph.forwards_plan(&BTreeSet::new(), &MigrationTarget::All)?;
//! assert_eq!(plan.len(), 2);
//! assert_eq!(plan[0].id.name, "0001_initial");
//! # Ok::<(), nest_core::migration::MigrationError>(())
//! ```

use crate::schema::{FieldDef, ModelKey, SchemaError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Identifies a migration: app namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MigrationId {
    /// App namespace
    pub app: String,
    /// Migration name, e.g. `0013_remove_project_owasp_repository_project_repositories`
    pub name: String,
}

impl MigrationId {
    /// Build an id.
    #[must_use]
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.name)
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a model with the given fields.
    CreateModel {
        /// Model to create
        model: ModelKey,
        /// Fields in declaration order
        fields: Vec<(String, FieldDef)>,
    },
    /// Delete a model.
    DeleteModel {
        /// Model to delete
        model: ModelKey,
    },
    /// Add a field.
    AddField {
        /// Target model
        model: ModelKey,
        /// Field name
        name: String,
        /// Field definition
        field: FieldDef,
    },
    /// Remove a field.
    RemoveField {
        /// Target model
        model: ModelKey,
        /// Field name
        name: String,
    },
    /// Replace a field's definition.
    AlterField {
        /// Target model
        model: ModelKey,
        /// Field name
        name: String,
        /// New definition
        field: FieldDef,
    },
    /// Rename a field, keeping its definition.
    RenameField {
        /// Target model
        model: ModelKey,
        /// Current name
        old_name: String,
        /// New name
        new_name: String,
    },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateModel { model, .. } => write!(f, "Create model {model}"),
            Self::DeleteModel { model } => write!(f, "Delete model {model}"),
            Self::AddField { model, name, .. } => write!(f, "Add field {name} to {model}"),
            Self::RemoveField { model, name } => write!(f, "Remove field {name} from {model}"),
            Self::AlterField { model, name, .. } => write!(f, "Alter field {name} on {model}"),
            Self::RenameField {
                model,
                old_name,
                new_name,
            } => write!(f, "Rename field {old_name} on {model} to {new_name}"),
        }
    }
}

/// A named, ordered batch of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// Identity
    pub id: MigrationId,
    /// Migrations that must be applied first
    pub dependencies: Vec<MigrationId>,
    /// Operations in application order
    pub operations: Vec<Operation>,
}

impl Migration {
    /// Empty migration.
    #[must_use]
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: MigrationId::new(app, name),
            dependencies: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Declare a dependency.
    #[must_use]
    pub fn depends_on(mut self, app: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push(MigrationId::new(app, name));
        self
    }

    /// Append an operation.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }
}

/// Errors raised while planning or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Two migrations share an id.
    #[error("Duplicate migration {0}")]
    DuplicateMigration(MigrationId),

    /// A dependency is not registered.
    #[error("Migration {migration} depends on unknown migration {dependency}")]
    UnknownDependency {
        /// Declaring migration
        migration: MigrationId,
        /// Missing dependency
        dependency: MigrationId,
    },

    /// The dependency graph is not acyclic.
    #[error("Circular dependency between migrations: {}", join_ids(.0))]
    Cycle(Vec<MigrationId>),

    /// Target app or migration does not exist or is ambiguous.
    #[error("Unknown migration target: {0}")]
    UnknownTarget(String),

    /// An operation's precondition does not hold against the current schema.
    #[error("Migration {migration} cannot apply '{operation}': {source}")]
    PreconditionFailed {
        /// Failing migration
        migration: MigrationId,
        /// Failing operation
        operation: String,
        /// Schema-level cause
        #[source]
        source: SchemaError,
    },

    /// The log records a migration as applied while its dependency is not.
    #[error("Migration {migration} is applied before its dependency {dependency}")]
    InconsistentHistory {
        /// Applied migration
        migration: MigrationId,
        /// Unapplied dependency
        dependency: MigrationId,
    },

    /// An applied migration no longer replays onto the recorded state.
    #[error("Applied migration {migration} does not replay: {source}")]
    ReplayFailed {
        /// Applied migration
        migration: MigrationId,
        /// Schema-level cause
        #[source]
        source: SchemaError,
    },

    /// Stored data violates bounds introduced by the migration.
    #[error("{count} existing value(s) of {model}.{field} fall outside [{min}, {max}]")]
    BoundViolation {
        /// Model
        model: ModelKey,
        /// Field
        field: String,
        /// Lower bound (`-inf` if none)
        min: f64,
        /// Upper bound (`inf` if none)
        max: f64,
        /// Offending rows
        count: i64,
    },

    /// Storage backend failure; the batch was rolled back.
    #[error("Storage error: {0}")]
    Storage(String),
}

fn join_ids(ids: &[MigrationId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// How far to migrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationTarget {
    /// Every registered migration.
    All,
    /// Every migration of an app, plus their dependencies.
    App(String),
    /// Exactly this migration: apply it and its ancestors, or, when it is
    /// already applied, unapply everything applied after it.
    To(MigrationId),
    /// Unapply every migration of an app, and everything depending on them.
    Zero(String),
}

/// Validated, acyclic set of migrations.
#[derive(Debug, Clone)]
pub struct MigrationGraph {
    nodes: BTreeMap<MigrationId, Migration>,
    children: BTreeMap<MigrationId, BTreeSet<MigrationId>>,
    order: Vec<MigrationId>,
}

impl MigrationGraph {
    /// Build and validate a graph.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::DuplicateMigration`],
    /// [`MigrationError::UnknownDependency`] or [`MigrationError::Cycle`].
    pub fn new(migrations: impl IntoIterator<Item = Migration>) -> Result<Self, MigrationError> {
        let mut nodes = BTreeMap::new();
        for migration in migrations {
            let id = migration.id.clone();
            if nodes.insert(id.clone(), migration).is_some() {
                return Err(MigrationError::DuplicateMigration(id));
            }
        }

        let mut children: BTreeMap<MigrationId, BTreeSet<MigrationId>> = BTreeMap::new();
        for (id, migration) in &nodes {
            for dependency in &migration.dependencies {
                if !nodes.contains_key(dependency) {
                    return Err(MigrationError::UnknownDependency {
                        migration: id.clone(),
                        dependency: dependency.clone(),
                    });
                }
                children
                    .entry(dependency.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }

        let order = topological_order(&nodes, &children)?;
        Ok(Self {
            nodes,
            children,
            order,
        })
    }

    /// Number of migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the id is registered.
    #[must_use]
    pub fn contains(&self, id: &MigrationId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look up a migration.
    #[must_use]
    pub fn get(&self, id: &MigrationId) -> Option<&Migration> {
        self.nodes.get(id)
    }

    /// Migrations in dependency order; ties broken by `(app, name)`.
    pub fn ordered(&self) -> impl Iterator<Item = &Migration> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Registered app namespaces.
    #[must_use]
    pub fn apps(&self) -> BTreeSet<&str> {
        self.nodes.keys().map(|id| id.app.as_str()).collect()
    }

    /// The migration itself plus everything it transitively depends on.
    #[must_use]
    pub fn ancestors(&self, id: &MigrationId) -> BTreeSet<MigrationId> {
        self.walk(id, |migration| migration.dependencies.iter().collect())
    }

    /// The migration itself plus everything that transitively depends on it.
    #[must_use]
    pub fn descendants(&self, id: &MigrationId) -> BTreeSet<MigrationId> {
        self.walk(id, |migration| {
            self.children
                .get(&migration.id)
                .map(|children| children.iter().collect())
                .unwrap_or_default()
        })
    }

    /// Resolve a CLI-style target: no app means everything, `zero` unapplies
    /// the app, otherwise `name` may be any unique prefix (`0013`).
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTarget`] for unknown apps and unknown
    /// or ambiguous names.
    pub fn target(
        &self,
        app: Option<&str>,
        name: Option<&str>,
    ) -> Result<MigrationTarget, MigrationError> {
        let Some(app) = app else {
            return Ok(MigrationTarget::All);
        };
        if !self.apps().contains(app) {
            return Err(MigrationError::UnknownTarget(format!("app '{app}'")));
        }

        match name {
            None => Ok(MigrationTarget::App(app.to_string())),
            Some("zero") => Ok(MigrationTarget::Zero(app.to_string())),
            Some(prefix) => {
                let mut matches = self
                    .nodes
                    .keys()
                    .filter(|id| id.app == app && id.name.starts_with(prefix));
                match (matches.next(), matches.next()) {
                    (Some(id), None) => Ok(MigrationTarget::To(id.clone())),
                    (None, _) => Err(MigrationError::UnknownTarget(format!(
                        "no migration in '{app}' matches '{prefix}'"
                    ))),
                    (Some(_), Some(_)) => Err(MigrationError::UnknownTarget(format!(
                        "more than one migration in '{app}' matches '{prefix}'"
                    ))),
                }
            }
        }
    }

    /// Pending migrations needed to reach `target`, in application order.
    ///
    /// Already applied migrations are skipped, so planning twice after a
    /// successful run yields an empty plan.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTarget`] if the target names nothing.
    pub fn forwards_plan(
        &self,
        applied: &BTreeSet<MigrationId>,
        target: &MigrationTarget,
    ) -> Result<Vec<&Migration>, MigrationError> {
        let roots: Vec<&MigrationId> = match target {
            MigrationTarget::All => self.nodes.keys().collect(),
            MigrationTarget::App(app) => self.app_ids(app)?,
            MigrationTarget::To(id) => vec![self.known(id)?],
            MigrationTarget::Zero(_) => Vec::new(),
        };

        let needed: BTreeSet<MigrationId> = roots
            .into_iter()
            .flat_map(|id| self.ancestors(id))
            .collect();

        Ok(self
            .ordered()
            .filter(|migration| needed.contains(&migration.id) && !applied.contains(&migration.id))
            .collect())
    }

    /// Applied migrations to unapply for `target`, in reverse application order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownTarget`] if the target names nothing.
    pub fn backwards_plan(
        &self,
        applied: &BTreeSet<MigrationId>,
        target: &MigrationTarget,
    ) -> Result<Vec<&Migration>, MigrationError> {
        let doomed: BTreeSet<MigrationId> = match target {
            // Only children in the target's own app are rolled back; another
            // app that merely depends on the target keeps its state.
            MigrationTarget::To(id) => self
                .children
                .get(self.known(id)?)
                .into_iter()
                .flatten()
                .filter(|child| child.app == id.app)
                .flat_map(|child| self.descendants(child))
                .collect(),
            MigrationTarget::Zero(app) => self
                .app_ids(app)?
                .into_iter()
                .flat_map(|id| self.descendants(id))
                .collect(),
            MigrationTarget::All | MigrationTarget::App(_) => BTreeSet::new(),
        };

        Ok(self
            .order
            .iter()
            .rev()
            .filter(|id| doomed.contains(*id) && applied.contains(*id))
            .filter_map(|id| self.nodes.get(id))
            .collect())
    }

    fn known<'a>(&self, id: &'a MigrationId) -> Result<&'a MigrationId, MigrationError> {
        if self.nodes.contains_key(id) {
            Ok(id)
        } else {
            Err(MigrationError::UnknownTarget(id.to_string()))
        }
    }

    fn app_ids(&self, app: &str) -> Result<Vec<&MigrationId>, MigrationError> {
        let ids: Vec<&MigrationId> = self.nodes.keys().filter(|id| id.app == app).collect();
        if ids.is_empty() {
            return Err(MigrationError::UnknownTarget(format!("app '{app}'")));
        }
        Ok(ids)
    }

    fn walk<'a, F>(&'a self, start: &MigrationId, next: F) -> BTreeSet<MigrationId>
    where
        F: Fn(&'a Migration) -> Vec<&'a MigrationId>,
    {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(migration) = self.nodes.get(&id) {
                stack.extend(next(migration).into_iter().cloned());
            }
        }
        seen
    }
}

/// Kahn's algorithm with a sorted ready set, so the order is deterministic.
fn topological_order(
    nodes: &BTreeMap<MigrationId, Migration>,
    children: &BTreeMap<MigrationId, BTreeSet<MigrationId>>,
) -> Result<Vec<MigrationId>, MigrationError> {
    let mut pending: BTreeMap<&MigrationId, usize> = nodes
        .iter()
        .map(|(id, migration)| {
            let distinct: BTreeSet<&MigrationId> = migration.dependencies.iter().collect();
            (id, distinct.len())
        })
        .collect();

    let mut ready: BTreeSet<&MigrationId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_first() {
        pending.remove(id);
        order.push(id.clone());

        for child in children.get(id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(child) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(child);
                }
            }
        }
    }

    if pending.is_empty() {
        Ok(order)
    } else {
        Err(MigrationError::Cycle(
            pending.into_keys().cloned().collect(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(app: &str, name: &str, deps: &[(&str, &str)]) -> Migration {
        deps.iter()
            .fold(Migration::new(app, name), |m, (a, n)| m.depends_on(*a, *n))
    }

    fn id(app: &str, name: &str) -> MigrationId {
        MigrationId::new(app, name)
    }

    fn sample_graph() -> MigrationGraph {
        MigrationGraph::new([
            node("owasp", "0013_repositories", &[("github", "0026_commits"), ("owasp", "0012_leaders")]),
            node("github", "0001_initial", &[]),
            node("owasp", "0012_leaders", &[("owasp", "0001_initial")]),
            node("github", "0026_commits", &[("github", "0001_initial")]),
            node("owasp", "0001_initial", &[("github", "0001_initial")]),
            node("owasp", "0036_score", &[("owasp", "0013_repositories")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_order_respects_dependencies_across_apps() {
        let graph = sample_graph();
        let order: Vec<String> = graph.ordered().map(|m| m.id.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "github.0001_initial",
                "github.0026_commits",
                "owasp.0001_initial",
                "owasp.0012_leaders",
                "owasp.0013_repositories",
                "owasp.0036_score",
            ]
        );
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = MigrationGraph::new([node("owasp", "0013", &[("github", "0026")])]).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownDependency { .. }));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = MigrationGraph::new([node("ai", "0001", &[]), node("ai", "0001", &[])]).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigration(_)));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = MigrationGraph::new([
            node("a", "1", &[("a", "2")]),
            node("a", "2", &[("a", "1")]),
            node("a", "0", &[]),
        ])
        .unwrap_err();

        match err {
            MigrationError::Cycle(ids) => assert_eq!(ids, vec![id("a", "1"), id("a", "2")]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_forwards_plan_skips_applied() {
        let graph = sample_graph();
        let applied: BTreeSet<_> = [id("github", "0001_initial"), id("owasp", "0001_initial")].into();

        let plan = graph
            .forwards_plan(&applied, &MigrationTarget::To(id("owasp", "0013_repositories")))
            .unwrap();
        let names: Vec<_> = plan.iter().map(|m| m.id.to_string()).collect();

        assert_eq!(
            names,
            vec!["github.0026_commits", "owasp.0012_leaders", "owasp.0013_repositories"]
        );
    }

    #[test]
    fn test_backwards_plan_unapplies_dependents_in_reverse() {
        let graph = sample_graph();
        let applied: BTreeSet<_> = graph.ordered().map(|m| m.id.clone()).collect();

        let plan = graph
            .backwards_plan(&applied, &MigrationTarget::To(id("owasp", "0012_leaders")))
            .unwrap();
        let names: Vec<_> = plan.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(names, vec!["owasp.0036_score", "owasp.0013_repositories"]);

        let plan = graph
            .backwards_plan(&applied, &MigrationTarget::Zero("github".into()))
            .unwrap();
        assert_eq!(plan.len(), graph.len());
        assert_eq!(plan.last().unwrap().id, id("github", "0001_initial"));
    }

    #[test]
    fn test_backwards_plan_keeps_other_apps_that_only_need_the_target() {
        let graph = sample_graph();
        let applied: BTreeSet<_> = graph.ordered().map(|m| m.id.clone()).collect();

        let plan = graph
            .backwards_plan(&applied, &MigrationTarget::To(id("github", "0001_initial")))
            .unwrap();
        let names: Vec<_> = plan.iter().map(|m| m.id.to_string()).collect();

        // owasp.0013 depends on github.0026, which is rolled back; owasp.0001
        // only depends on the target itself and stays.
        assert_eq!(
            names,
            vec!["owasp.0036_score", "owasp.0013_repositories", "github.0026_commits"]
        );
    }

    #[test]
    fn test_target_resolution() {
        let graph = sample_graph();
        assert_eq!(graph.target(None, None).unwrap(), MigrationTarget::All);
        assert_eq!(
            graph.target(Some("owasp"), Some("0013")).unwrap(),
            MigrationTarget::To(id("owasp", "0013_repositories"))
        );
        assert_eq!(
            graph.target(Some("owasp"), Some("zero")).unwrap(),
            MigrationTarget::Zero("owasp".into())
        );
        assert!(matches!(
            graph.target(Some("owasp"), Some("00")),
            Err(MigrationError::UnknownTarget(_))
        ));
        assert!(matches!(
            graph.target(Some("auth"), None),
            Err(MigrationError::UnknownTarget(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_order_is_topological(
            deps in prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..4), 1..16),
            rotate in any::<prop::sample::Index>(),
        ) {
            // Node i may only depend on nodes 0..i, so the input is always a DAG.
            let mut migrations: Vec<Migration> = deps
                .iter()
                .enumerate()
                .map(|(i, picks)| {
                    let base = Migration::new("app", format!("{i:04}"));
                    if i == 0 {
                        return base;
                    }
                    picks.iter().fold(base, |m, pick| m.depends_on("app", format!("{:04}", pick.index(i))))
                })
                .collect();
            let len = migrations.len();
            migrations.rotate_left(rotate.index(len));

            let graph = MigrationGraph::new(migrations).unwrap();
            let position: BTreeMap<MigrationId, usize> = graph
                .ordered()
                .enumerate()
                .map(|(pos, m)| (m.id.clone(), pos))
                .collect();

            prop_assert_eq!(position.len(), len);
            for migration in graph.ordered() {
                for dep in &migration.dependencies {
                    prop_assert!(position[dep] < position[&migration.id]);
                }
            }

            let all: BTreeSet<MigrationId> = position.keys().cloned().collect();
            prop_assert!(graph.forwards_plan(&all, &MigrationTarget::All).unwrap().is_empty());
        }
    }
}

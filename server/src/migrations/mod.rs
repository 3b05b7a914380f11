//! Registered schema migrations, one module per app.
//!
//! Names and dependencies are stable: they are what the `schema_migrations`
//! log records, so renaming a migration makes existing databases look
//! inconsistent.

mod ai;
mod github;
mod owasp;

use nest_core::migration::{Migration, MigrationError, MigrationGraph};
use nest_core::schema::ModelKey;

/// Every migration of every app.
#[must_use]
pub fn all() -> Vec<Migration> {
    github::migrations()
        .into_iter()
        .chain(owasp::migrations())
        .chain(ai::migrations())
        .collect()
}

/// Validated migration graph for the whole project.
///
/// # Errors
///
/// Returns [`MigrationError`] if the registry has duplicates, dangling
/// dependencies or cycles.
pub fn registry() -> Result<MigrationGraph, MigrationError> {
    MigrationGraph::new(all())
}

/// `github.repository`
#[must_use]
pub fn repository() -> ModelKey {
    ModelKey::new("github", "repository")
}

/// `owasp.project`
#[must_use]
pub fn project() -> ModelKey {
    ModelKey::new("owasp", "project")
}

/// `owasp.projecthealthmetrics`
#[must_use]
pub fn project_health_metrics() -> ModelKey {
    ModelKey::new("owasp", "projecthealthmetrics")
}

/// `owasp.event`
#[must_use]
pub fn event() -> ModelKey {
    ModelKey::new("owasp", "event")
}

/// `ai.chunk`
#[must_use]
pub fn chunk() -> ModelKey {
    ModelKey::new("ai", "chunk")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_valid() {
        let graph = registry().unwrap();
        assert_eq!(graph.len(), all().len());
        assert_eq!(graph.apps().into_iter().collect::<Vec<_>>(), vec!["ai", "github", "owasp"]);
    }
}

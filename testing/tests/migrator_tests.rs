//! Migrator behaviour against the in-memory backend

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use nest_core::migration::{Migration, MigrationError, MigrationGraph, MigrationId, MigrationTarget, Operation};
use nest_core::migrator::{Direction, MigrationBackend, Migrator, PlannedMigration};
use nest_core::schema::{AppliedOperation, FieldDef, FieldKind, ModelKey, ModelState, SchemaError};
use nest_core::validation::Validator;
use nest_testing::{init_test_tracing, InMemoryMigrationBackend};

fn repository() -> ModelKey {
    ModelKey::new("github", "repository")
}

fn project() -> ModelKey {
    ModelKey::new("owasp", "project")
}

fn metrics() -> ModelKey {
    ModelKey::new("owasp", "projecthealthmetrics")
}

fn graph() -> MigrationGraph {
    MigrationGraph::new([
        Migration::new("github", "0001_initial").operation(Operation::CreateModel {
            model: repository(),
            fields: vec![("id".into(), FieldDef::primary_key())],
        }),
        Migration::new("owasp", "0001_initial")
            .depends_on("github", "0001_initial")
            .operation(Operation::CreateModel {
                model: project(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    ("owasp_repository".into(), FieldDef::foreign_key(repository()).nullable()),
                    ("name".into(), FieldDef::text()),
                ],
            })
            .operation(Operation::CreateModel {
                model: metrics(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    ("project".into(), FieldDef::foreign_key(project())),
                    ("score".into(), FieldDef::float().nullable()),
                ],
            }),
        Migration::new("owasp", "0002_repositories")
            .depends_on("owasp", "0001_initial")
            .operation(Operation::RemoveField {
                model: project(),
                name: "owasp_repository".into(),
            })
            .operation(Operation::AddField {
                model: project(),
                name: "repositories".into(),
                field: FieldDef::many_to_many(repository()).with_verbose_name("Repositories"),
            }),
        Migration::new("owasp", "0003_score_bounds")
            .depends_on("owasp", "0002_repositories")
            .operation(Operation::AlterField {
                model: metrics(),
                name: "score".into(),
                field: FieldDef::float()
                    .nullable()
                    .with_help_text("Project health score (0-100)")
                    .with_validators([Validator::MinValue(0.0), Validator::MaxValue(100.0)]),
            }),
    ])
    .unwrap()
}

fn id(app: &str, name: &str) -> MigrationId {
    MigrationId::new(app, name)
}

#[tokio::test]
async fn test_migrate_all_then_again_is_noop() {
    init_test_tracing();
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());

    let report = migrator.migrate(&MigrationTarget::All).await.unwrap();
    assert_eq!(report.applied.len(), 4);
    assert!(report.unapplied.is_empty());

    let again = migrator.migrate(&MigrationTarget::All).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(backend.committed_batches(), 1);

    let schema = backend.schema();
    assert!(!schema.has_field(&project(), "owasp_repository"));
    assert_eq!(
        schema.field(&project(), "repositories").unwrap().kind,
        FieldKind::ManyToMany { to: repository() }
    );
    assert_eq!(schema, migrator.project_state().await.unwrap());
}

#[tokio::test]
async fn test_failed_batch_leaves_schema_and_log_unchanged() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());
    migrator
        .migrate(&MigrationTarget::To(id("owasp", "0001_initial")))
        .await
        .unwrap();
    let before = backend.schema();

    backend.fail_on(id("owasp", "0002_repositories"));
    let err = migrator.migrate(&MigrationTarget::All).await.unwrap_err();
    assert!(matches!(err, MigrationError::Storage(_)));

    assert_eq!(backend.schema(), before);
    assert!(backend.schema().has_field(&project(), "owasp_repository"));
    assert_eq!(
        backend.applied_ids(),
        vec![id("github", "0001_initial"), id("owasp", "0001_initial")]
    );

    backend.clear_failure();
    let report = migrator.migrate(&MigrationTarget::All).await.unwrap();
    assert_eq!(
        report.applied,
        vec![id("owasp", "0002_repositories"), id("owasp", "0003_score_bounds")]
    );
}

#[tokio::test]
async fn test_precondition_failure_touches_nothing() {
    let backend = InMemoryMigrationBackend::new();
    let broken = MigrationGraph::new([
        Migration::new("github", "0001_initial").operation(Operation::CreateModel {
            model: repository(),
            fields: vec![("id".into(), FieldDef::primary_key())],
        }),
        Migration::new("github", "0002_drop_missing")
            .depends_on("github", "0001_initial")
            .operation(Operation::RemoveField {
                model: repository(),
                name: "commits_count".into(),
            }),
    ])
    .unwrap();
    let migrator = Migrator::new(broken, backend.clone());

    let err = migrator.migrate(&MigrationTarget::All).await.unwrap_err();
    match err {
        MigrationError::PreconditionFailed {
            migration, source, ..
        } => {
            assert_eq!(migration, id("github", "0002_drop_missing"));
            assert!(matches!(source, SchemaError::UnknownField { .. }));
        }
        other => panic!("expected precondition failure, got {other:?}"),
    }

    assert!(backend.applied_ids().is_empty());
    assert_eq!(backend.committed_batches(), 0);
}

#[tokio::test]
async fn test_bound_violation_aborts_batch() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());
    migrator
        .migrate(&MigrationTarget::To(id("owasp", "0002_repositories")))
        .await
        .unwrap();

    backend.write_float(&metrics(), "score", Some(150.0)).unwrap();
    backend.write_float(&metrics(), "score", None).unwrap();

    let err = migrator.migrate(&MigrationTarget::All).await.unwrap_err();
    assert!(matches!(err, MigrationError::BoundViolation { count: 1, .. }));
    assert!(backend.schema().field(&metrics(), "score").unwrap().validators.is_empty());
}

#[tokio::test]
async fn test_score_bounds_enforced_after_migration() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());
    migrator.migrate(&MigrationTarget::All).await.unwrap();

    backend.write_float(&metrics(), "score", None).unwrap();
    backend.write_float(&metrics(), "score", Some(0.0)).unwrap();
    backend.write_float(&metrics(), "score", Some(100.0)).unwrap();

    let err = backend.write_float(&metrics(), "score", Some(150.0)).unwrap_err();
    assert!(matches!(err, SchemaError::Validation { .. }));
    assert_eq!(
        backend.floats(&metrics(), "score"),
        vec![None, Some(0.0), Some(100.0)]
    );
}

#[tokio::test]
async fn test_backwards_to_restores_previous_fields() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());
    migrator.migrate(&MigrationTarget::All).await.unwrap();

    let report = migrator
        .migrate(&MigrationTarget::To(id("owasp", "0001_initial")))
        .await
        .unwrap();
    assert_eq!(
        report.unapplied,
        vec![id("owasp", "0003_score_bounds"), id("owasp", "0002_repositories")]
    );

    let schema = backend.schema();
    assert!(schema.has_field(&project(), "owasp_repository"));
    assert!(!schema.has_field(&project(), "repositories"));
    assert!(schema.field(&metrics(), "score").unwrap().validators.is_empty());

    let names: Vec<&str> = schema
        .model(&project())
        .unwrap()
        .fields
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, vec!["id", "owasp_repository", "name"]);
    assert_eq!(schema, migrator.project_state().await.unwrap());
}

#[tokio::test]
async fn test_zero_unapplies_app_and_dependents() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());
    migrator.migrate(&MigrationTarget::All).await.unwrap();

    let report = migrator
        .migrate(&MigrationTarget::Zero("github".into()))
        .await
        .unwrap();
    assert_eq!(report.unapplied.len(), 4);
    assert!(backend.applied_ids().is_empty());
    assert_eq!(backend.schema().models().count(), 0);
}

#[tokio::test]
async fn test_plan_reports_steps_without_applying() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend.clone());

    let plan = migrator.plan(&MigrationTarget::App("owasp".into())).await.unwrap();
    assert_eq!(plan.steps.len(), 4);
    assert!(plan.steps.iter().all(|s| s.direction == Direction::Forwards));

    let step = &plan.steps[2];
    assert!(step.operations[0].drops_relation());
    assert!(backend.applied_ids().is_empty());
}

#[tokio::test]
async fn test_status_lists_every_migration_in_order() {
    let backend = InMemoryMigrationBackend::new();
    let migrator = Migrator::new(graph(), backend);
    migrator
        .migrate(&MigrationTarget::To(id("owasp", "0001_initial")))
        .await
        .unwrap();

    let status = migrator.status().await.unwrap();
    let applied: Vec<(String, bool)> = status
        .iter()
        .map(|s| (s.id.to_string(), s.is_applied()))
        .collect();
    assert_eq!(
        applied,
        vec![
            ("github.0001_initial".to_string(), true),
            ("owasp.0001_initial".to_string(), true),
            ("owasp.0002_repositories".to_string(), false),
            ("owasp.0003_score_bounds".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_inconsistent_history_rejected() {
    let backend = InMemoryMigrationBackend::new();
    backend
        .apply_batch(&[PlannedMigration {
            id: id("owasp", "0001_initial"),
            dependencies: vec![id("github", "0001_initial")],
            direction: Direction::Forwards,
            operations: Vec::new(),
        }])
        .await
        .unwrap();

    let migrator = Migrator::new(graph(), backend);
    let err = migrator.migrate(&MigrationTarget::All).await.unwrap_err();
    assert!(matches!(err, MigrationError::InconsistentHistory { .. }));
}

#[tokio::test]
async fn test_unregistered_log_entries_are_ignored() {
    let backend = InMemoryMigrationBackend::new();
    backend
        .apply_batch(&[PlannedMigration {
            id: id("legacy", "0001_initial"),
            dependencies: Vec::new(),
            direction: Direction::Forwards,
            operations: vec![AppliedOperation::CreateModel {
                model: ModelState {
                    key: ModelKey::new("legacy", "thing"),
                    fields: vec![("id".into(), FieldDef::primary_key())],
                },
            }],
        }])
        .await
        .unwrap();

    let migrator = Migrator::new(graph(), backend);
    let report = migrator.migrate(&MigrationTarget::All).await.unwrap();
    assert_eq!(report.applied.len(), 4);
}

//! The registered migrations, run against the in-memory backend.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use nest_core::migration::{MigrationError, MigrationId, MigrationTarget};
use nest_core::migrator::Migrator;
use nest_core::schema::{FieldKind, SchemaError};
use nest_core::validation::Validator;
use nest_server::migrations::{self, project, project_health_metrics, repository};
use nest_testing::{InMemoryMigrationBackend, init_test_tracing};

const M0013: &str = "0013_remove_project_owasp_repository_project_repositories";
const M0035: &str =
    "0035_rename_total_pull_request_count_projecthealthmetrics_total_pull_requests_count";
const M0036: &str = "0036_alter_projecthealthmetrics_score";

fn migrator() -> (Migrator<InMemoryMigrationBackend>, InMemoryMigrationBackend) {
    init_test_tracing();
    let backend = InMemoryMigrationBackend::new();
    (
        Migrator::new(migrations::registry().unwrap(), backend.clone()),
        backend,
    )
}

#[test]
fn test_evidenced_migrations_declare_their_dependencies() {
    let graph = migrations::registry().unwrap();

    let m0013 = graph.get(&MigrationId::new("owasp", M0013)).unwrap();
    assert_eq!(
        m0013.dependencies,
        vec![
            MigrationId::new("github", "0026_repository_commits_count"),
            MigrationId::new("owasp", "0012_remove_project_owasp_leaders_and_more"),
        ]
    );
    assert_eq!(m0013.operations.len(), 2);

    let m0036 = graph.get(&MigrationId::new("owasp", M0036)).unwrap();
    assert_eq!(m0036.dependencies, vec![MigrationId::new("owasp", M0035)]);
}

#[test]
fn test_target_accepts_unique_prefix() {
    let graph = migrations::registry().unwrap();
    assert_eq!(
        graph.target(Some("owasp"), Some("0013")).unwrap(),
        MigrationTarget::To(MigrationId::new("owasp", M0013))
    );
    assert!(matches!(
        graph.target(Some("owasp"), Some("00")),
        Err(MigrationError::UnknownTarget(_))
    ));
    assert!(matches!(
        graph.target(Some("frontend"), None),
        Err(MigrationError::UnknownTarget(_))
    ));
}

#[tokio::test]
async fn test_project_repository_link_becomes_many_to_many() {
    let (migrator, backend) = migrator();
    migrator
        .migrate(&MigrationTarget::To(MigrationId::new("owasp", M0013)))
        .await
        .unwrap();

    let schema = backend.schema();
    assert!(matches!(
        schema.field(&project(), "owasp_repository"),
        Err(SchemaError::UnknownField { .. })
    ));

    let repositories = schema.field(&project(), "repositories").unwrap();
    assert_eq!(repositories.kind, FieldKind::ManyToMany { to: repository() });
    assert_eq!(repositories.verbose_name.as_deref(), Some("Repositories"));
}

#[tokio::test]
async fn test_score_bounds_after_0036() {
    let (migrator, backend) = migrator();
    migrator.migrate(&MigrationTarget::All).await.unwrap();

    let metrics = project_health_metrics();
    let score = backend.schema().field(&metrics, "score").unwrap().clone();
    assert_eq!(score.kind, FieldKind::Float);
    assert!(score.null);
    assert_eq!(score.help_text.as_deref(), Some("Project health score (0-100)"));
    assert_eq!(
        score.validators,
        vec![Validator::MinValue(0.0), Validator::MaxValue(100.0)]
    );

    assert!(backend.write_float(&metrics, "score", Some(150.0)).is_err());
    assert!(backend.write_float(&metrics, "score", Some(-0.5)).is_err());
    backend.write_float(&metrics, "score", Some(100.0)).unwrap();
    backend.write_float(&metrics, "score", Some(0.0)).unwrap();
    backend.write_float(&metrics, "score", None).unwrap();
    assert_eq!(
        backend.floats(&metrics, "score"),
        vec![Some(100.0), Some(0.0), None]
    );
}

#[tokio::test]
async fn test_0036_refuses_out_of_range_rows() {
    let (migrator, backend) = migrator();
    migrator
        .migrate(&MigrationTarget::To(MigrationId::new("owasp", M0035)))
        .await
        .unwrap();

    let metrics = project_health_metrics();
    backend.write_float(&metrics, "score", Some(150.0)).unwrap();
    backend.write_float(&metrics, "score", Some(42.0)).unwrap();

    let err = migrator.migrate(&MigrationTarget::All).await.unwrap_err();
    assert!(matches!(err, MigrationError::BoundViolation { count: 1, .. }));
    assert!(backend.schema().field(&metrics, "score").unwrap().validators.is_empty());
    assert!(!backend.applied_ids().contains(&MigrationId::new("owasp", M0036)));
}

#[tokio::test]
async fn test_migrate_to_0035_unapplies_0036_only() {
    let (migrator, backend) = migrator();
    migrator.migrate(&MigrationTarget::All).await.unwrap();

    let report = migrator
        .migrate(&MigrationTarget::To(MigrationId::new("owasp", M0035)))
        .await
        .unwrap();
    assert_eq!(report.unapplied, vec![MigrationId::new("owasp", M0036)]);

    let score = backend
        .schema()
        .field(&project_health_metrics(), "score")
        .unwrap()
        .clone();
    assert!(score.validators.is_empty());
    assert!(score.help_text.is_none());
    assert!(backend.schema().has_field(&project_health_metrics(), "total_pull_requests_count"));
}

#[tokio::test]
async fn test_migrate_github_back_to_initial_keeps_owasp_base() {
    let (migrator, backend) = migrator();
    migrator.migrate(&MigrationTarget::All).await.unwrap();

    let report = migrator
        .migrate(&MigrationTarget::To(MigrationId::new("github", "0001_initial")))
        .await
        .unwrap();
    assert!(report.unapplied.contains(&MigrationId::new("github", "0026_repository_commits_count")));
    assert!(report.unapplied.contains(&MigrationId::new("owasp", M0013)));

    let applied = backend.applied_ids();
    assert!(applied.contains(&MigrationId::new("owasp", "0001_initial")));
    assert!(applied.contains(&MigrationId::new(
        "owasp",
        "0012_remove_project_owasp_leaders_and_more"
    )));
    assert!(backend.schema().model(&project()).is_ok());
    assert!(backend.schema().has_field(&project(), "owasp_repository"));
    assert!(!backend.schema().has_field(&repository(), "commits_count"));
    assert_eq!(backend.schema(), migrator.project_state().await.unwrap());
}

#[tokio::test]
async fn test_owasp_zero_then_forwards_again() {
    let (migrator, backend) = migrator();
    migrator.migrate(&MigrationTarget::All).await.unwrap();
    let full = backend.schema();

    let report = migrator
        .migrate(&MigrationTarget::Zero("owasp".to_string()))
        .await
        .unwrap();
    assert_eq!(report.unapplied.len(), 6);
    assert!(backend.applied_ids().iter().all(|id| id.app != "owasp"));
    assert!(backend.schema().model(&project()).is_err());

    migrator.migrate(&MigrationTarget::All).await.unwrap();
    assert_eq!(backend.schema(), full);
}

#[tokio::test]
async fn test_every_app_applies_and_second_run_is_noop() {
    let (migrator, backend) = migrator();
    let report = migrator.migrate(&MigrationTarget::All).await.unwrap();
    assert_eq!(report.applied.len(), migrations::all().len());

    assert!(migrator.migrate(&MigrationTarget::All).await.unwrap().is_empty());
    assert_eq!(backend.committed_batches(), 1);
    assert!(migrator.status().await.unwrap().iter().all(|s| s.is_applied()));
}

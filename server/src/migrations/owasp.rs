//! `owasp` app migrations.
//!
//! History is kept down to the steps that shape the project, its health
//! metrics and events. `0013` swaps the single repository link for a
//! many-to-many relation without carrying links over; `0036` bounds the
//! health score.

use super::{event, project, project_health_metrics, repository};
use nest_core::migration::{Migration, Operation};
use nest_core::model::HealthScore;
use nest_core::schema::FieldDef;

pub(super) fn migrations() -> Vec<Migration> {
    vec![
        Migration::new("owasp", "0001_initial")
            .depends_on("github", "0001_initial")
            .operation(Operation::CreateModel {
                model: project(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    ("name".into(), FieldDef::text().with_verbose_name("Name")),
                    ("owasp_leaders".into(), FieldDef::text().nullable()),
                    (
                        "owasp_repository".into(),
                        FieldDef::foreign_key(repository())
                            .nullable()
                            .with_verbose_name("OWASP repository"),
                    ),
                    ("created_at".into(), FieldDef::created_at()),
                    ("updated_at".into(), FieldDef::updated_at()),
                ],
            })
            .operation(Operation::CreateModel {
                model: event(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    ("name".into(), FieldDef::text().with_verbose_name("Name")),
                    ("description".into(), FieldDef::text().with_verbose_name("Description")),
                    ("url".into(), FieldDef::url().with_verbose_name("URL")),
                    ("created_at".into(), FieldDef::created_at()),
                    ("updated_at".into(), FieldDef::updated_at()),
                ],
            }),
        Migration::new("owasp", "0012_remove_project_owasp_leaders_and_more")
            .depends_on("owasp", "0001_initial")
            .operation(Operation::RemoveField {
                model: project(),
                name: "owasp_leaders".into(),
            })
            .operation(Operation::AddField {
                model: project(),
                name: "leaders_raw".into(),
                field: FieldDef::text().nullable().with_verbose_name("Leaders"),
            }),
        Migration::new("owasp", "0013_remove_project_owasp_repository_project_repositories")
            .depends_on("github", "0026_repository_commits_count")
            .depends_on("owasp", "0012_remove_project_owasp_leaders_and_more")
            .operation(Operation::RemoveField {
                model: project(),
                name: "owasp_repository".into(),
            })
            .operation(Operation::AddField {
                model: project(),
                name: "repositories".into(),
                field: FieldDef::many_to_many(repository()).with_verbose_name("Repositories"),
            }),
        Migration::new("owasp", "0032_projecthealthmetrics")
            .depends_on("owasp", "0013_remove_project_owasp_repository_project_repositories")
            .operation(Operation::CreateModel {
                model: project_health_metrics(),
                fields: vec![
                    ("id".into(), FieldDef::primary_key()),
                    ("project".into(), FieldDef::foreign_key(project())),
                    ("score".into(), FieldDef::float().nullable()),
                    ("total_pull_request_count".into(), FieldDef::integer().nullable()),
                    ("created_at".into(), FieldDef::created_at()),
                    ("updated_at".into(), FieldDef::updated_at()),
                ],
            }),
        Migration::new(
            "owasp",
            "0035_rename_total_pull_request_count_projecthealthmetrics_total_pull_requests_count",
        )
        .depends_on("owasp", "0032_projecthealthmetrics")
        .operation(Operation::RenameField {
            model: project_health_metrics(),
            old_name: "total_pull_request_count".into(),
            new_name: "total_pull_requests_count".into(),
        }),
        Migration::new("owasp", "0036_alter_projecthealthmetrics_score")
            .depends_on(
                "owasp",
                "0035_rename_total_pull_request_count_projecthealthmetrics_total_pull_requests_count",
            )
            .operation(Operation::AlterField {
                model: project_health_metrics(),
                name: "score".into(),
                field: FieldDef::float()
                    .nullable()
                    .with_help_text("Project health score (0-100)")
                    .with_validators(HealthScore::VALIDATORS),
            }),
    ]
}

//! `github` app migrations.

use super::repository;
use nest_core::migration::{Migration, Operation};
use nest_core::schema::FieldDef;

pub(super) fn migrations() -> Vec<Migration> {
    vec![
        Migration::new("github", "0001_initial").operation(Operation::CreateModel {
            model: repository(),
            fields: vec![
                ("id".into(), FieldDef::primary_key()),
                ("name".into(), FieldDef::text()),
                ("created_at".into(), FieldDef::created_at()),
                ("updated_at".into(), FieldDef::updated_at()),
            ],
        }),
        Migration::new("github", "0026_repository_commits_count")
            .depends_on("github", "0001_initial")
            .operation(Operation::AddField {
                model: repository(),
                name: "commits_count".into(),
                field: FieldDef::integer().nullable().with_verbose_name("Commits"),
            }),
    ]
}

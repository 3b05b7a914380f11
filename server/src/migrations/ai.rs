//! `ai` app migrations.

use super::chunk;
use nest_core::migration::{Migration, Operation};
use nest_core::schema::FieldDef;

pub(super) fn migrations() -> Vec<Migration> {
    vec![Migration::new("ai", "0001_initial").operation(Operation::CreateModel {
        model: chunk(),
        fields: vec![
            ("id".into(), FieldDef::primary_key()),
            ("text".into(), FieldDef::text().with_verbose_name("Text")),
            ("context".into(), FieldDef::text().with_verbose_name("Context")),
        ],
    })]
}

//! SQL generation for schema operations.
//!
//! Pure functions: every [`AppliedOperation`] maps to a list of statements
//! that [`crate::PostgresMigrationBackend`] runs inside its batch transaction.
//!
//! Naming follows the usual relational conventions:
//!
//! | Concept              | Name                          |
//! |----------------------|-------------------------------|
//! | model table          | `{app}_{model}`               |
//! | foreign key column   | `{field}_id`                  |
//! | many-to-many table   | `{app}_{model}_{field}`       |
//! | range constraint     | `{table}_{column}_range`      |

use nest_core::migration::MigrationError;
use nest_core::schema::{AppliedOperation, FieldDef, FieldKind, ModelKey, ModelState};
use nest_core::validation::bounds;

/// DDL for the applied-migrations log.
pub const CREATE_LOG_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    app TEXT NOT NULL,
    name TEXT NOT NULL,
    dependencies TEXT[] NOT NULL DEFAULT '{}',
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (app, name)
)";

/// Quote an identifier.
#[must_use]
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column that stores a field, `None` for many-to-many fields.
#[must_use]
pub fn column_name(name: &str, field: &FieldDef) -> Option<String> {
    match field.kind {
        FieldKind::ManyToMany { .. } => None,
        FieldKind::ForeignKey { .. } => Some(format!("{name}_id")),
        _ => Some(name.to_string()),
    }
}

/// Join table backing a many-to-many field.
#[must_use]
pub fn join_table_name(model: &ModelKey, field: &str) -> String {
    format!("{}_{field}", model.table_name())
}

/// Name of the range constraint on a column.
#[must_use]
pub fn range_constraint_name(model: &ModelKey, column: &str) -> String {
    format!("{}_{column}_range", model.table_name())
}

fn sql_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::BigAutoPk | FieldKind::ForeignKey { .. } | FieldKind::ManyToMany { .. } => {
            "BIGINT"
        }
        FieldKind::Text => "TEXT",
        FieldKind::Url => "VARCHAR(200)",
        FieldKind::Integer => "INTEGER",
        FieldKind::Float => "DOUBLE PRECISION",
        FieldKind::DateTime { .. } => "TIMESTAMPTZ",
    }
}

fn column_definition(column: &str, field: &FieldDef) -> String {
    let mut sql = format!("{} {}", quote(column), sql_type(&field.kind));
    match &field.kind {
        FieldKind::BigAutoPk => sql.push_str(" GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"),
        FieldKind::ForeignKey { to } => {
            sql.push_str(if field.null { " NULL" } else { " NOT NULL" });
            sql.push_str(&format!(
                " REFERENCES {} (\"id\") DEFERRABLE INITIALLY DEFERRED",
                quote(&to.table_name())
            ));
        }
        _ => sql.push_str(if field.null { " NULL" } else { " NOT NULL" }),
    }
    sql
}

/// Boolean SQL expression for the field's numeric bounds, if it has any.
#[must_use]
pub fn range_predicate(column: &str, field: &FieldDef) -> Option<String> {
    match bounds(&field.validators) {
        (None, None) => None,
        (Some(min), None) => Some(format!("{} >= {min:?}", quote(column))),
        (None, Some(max)) => Some(format!("{} <= {max:?}", quote(column))),
        (Some(min), Some(max)) => Some(format!(
            "{col} >= {min:?} AND {col} <= {max:?}",
            col = quote(column)
        )),
    }
}

fn add_range_constraint(model: &ModelKey, column: &str, field: &FieldDef) -> Option<String> {
    range_predicate(column, field).map(|predicate| {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({predicate})",
            quote(&model.table_name()),
            quote(&range_constraint_name(model, column))
        )
    })
}

fn drop_range_constraint(model: &ModelKey, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
        quote(&model.table_name()),
        quote(&range_constraint_name(model, column))
    )
}

fn create_join_table(model: &ModelKey, field: &str, to: &ModelKey) -> String {
    let (from_column, to_column) = if to == model {
        (format!("from_{}_id", model.model), format!("to_{}_id", to.model))
    } else {
        (format!("{}_id", model.model), format!("{}_id", to.model))
    };

    format!(
        "CREATE TABLE {table} (\
         \"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY, \
         {from} BIGINT NOT NULL REFERENCES {from_table} (\"id\") ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED, \
         {to} BIGINT NOT NULL REFERENCES {to_table} (\"id\") ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED, \
         UNIQUE ({from}, {to}))",
        table = quote(&join_table_name(model, field)),
        from = quote(&from_column),
        from_table = quote(&model.table_name()),
        to = quote(&to_column),
        to_table = quote(&to.table_name()),
    )
}

fn drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote(table))
}

fn create_model(model: &ModelState) -> Vec<String> {
    let mut columns = Vec::new();
    let mut checks = Vec::new();
    let mut join_tables = Vec::new();

    for (name, field) in &model.fields {
        if let FieldKind::ManyToMany { to } = &field.kind {
            join_tables.push(create_join_table(&model.key, name, to));
            continue;
        }
        let column = column_name(name, field).unwrap_or_else(|| name.clone());
        if let Some(predicate) = range_predicate(&column, field) {
            checks.push(format!(
                "CONSTRAINT {} CHECK ({predicate})",
                quote(&range_constraint_name(&model.key, &column))
            ));
        }
        columns.push(column_definition(&column, field));
    }

    columns.extend(checks);
    let mut statements = vec![format!(
        "CREATE TABLE {} ({})",
        quote(&model.key.table_name()),
        columns.join(", ")
    )];
    statements.extend(join_tables);
    statements
}

fn delete_model(model: &ModelState) -> Vec<String> {
    let mut statements: Vec<String> = model
        .fields
        .iter()
        .filter(|(_, field)| field.kind.is_many_to_many())
        .map(|(name, _)| drop_table(&join_table_name(&model.key, name)))
        .collect();
    statements.push(drop_table(&model.key.table_name()));
    statements
}

fn add_field(model: &ModelKey, name: &str, field: &FieldDef) -> Vec<String> {
    match (&field.kind, column_name(name, field)) {
        (FieldKind::ManyToMany { to }, _) => vec![create_join_table(model, name, to)],
        (_, Some(column)) => {
            let mut statements = vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote(&model.table_name()),
                column_definition(&column, field)
            )];
            statements.extend(add_range_constraint(model, &column, field));
            statements
        }
        (_, None) => Vec::new(),
    }
}

fn remove_field(model: &ModelKey, name: &str, previous: &FieldDef) -> Vec<String> {
    match column_name(name, previous) {
        None => vec![drop_table(&join_table_name(model, name))],
        Some(column) => vec![format!(
            "ALTER TABLE {} DROP COLUMN {} CASCADE",
            quote(&model.table_name()),
            quote(&column)
        )],
    }
}

fn alter_field(
    model: &ModelKey,
    name: &str,
    previous: &FieldDef,
    field: &FieldDef,
) -> Result<Vec<String>, MigrationError> {
    let table = quote(&model.table_name());

    match (&previous.kind, &field.kind) {
        (FieldKind::ManyToMany { to: old }, FieldKind::ManyToMany { to: new }) => {
            if old == new {
                return Ok(Vec::new());
            }
            return Ok(vec![
                drop_table(&join_table_name(model, name)),
                create_join_table(model, name, new),
            ]);
        }
        (FieldKind::ManyToMany { .. }, _) | (_, FieldKind::ManyToMany { .. }) => {
            return Err(MigrationError::Storage(format!(
                "cannot alter {model}.{name} between a many-to-many relation and a column"
            )));
        }
        _ => {}
    }

    let old_column = column_name(name, previous).unwrap_or_else(|| name.to_string());
    let column = column_name(name, field).unwrap_or_else(|| name.to_string());
    let mut statements = Vec::new();

    if old_column != column {
        statements.push(format!(
            "ALTER TABLE {table} RENAME COLUMN {} TO {}",
            quote(&old_column),
            quote(&column)
        ));
    }

    if sql_type(&previous.kind) != sql_type(&field.kind) {
        statements.push(format!(
            "ALTER TABLE {table} ALTER COLUMN {col} TYPE {ty} USING {col}::{ty}",
            col = quote(&column),
            ty = sql_type(&field.kind)
        ));
    }

    if previous.null != field.null {
        statements.push(format!(
            "ALTER TABLE {table} ALTER COLUMN {} {} NOT NULL",
            quote(&column),
            if field.null { "DROP" } else { "SET" }
        ));
    }

    if previous.validators != field.validators || old_column != column {
        statements.push(drop_range_constraint(model, &old_column));
        statements.extend(add_range_constraint(model, &column, field));
    }

    Ok(statements)
}

fn rename_field(model: &ModelKey, old_name: &str, new_name: &str, field: &FieldDef) -> Vec<String> {
    let table = quote(&model.table_name());
    match (column_name(old_name, field), column_name(new_name, field)) {
        (Some(old_column), Some(new_column)) => {
            let mut statements = vec![format!(
                "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                quote(&old_column),
                quote(&new_column)
            )];
            if range_predicate(&new_column, field).is_some() {
                statements.push(format!(
                    "ALTER TABLE {table} RENAME CONSTRAINT {} TO {}",
                    quote(&range_constraint_name(model, &old_column)),
                    quote(&range_constraint_name(model, &new_column))
                ));
            }
            statements
        }
        _ => vec![format!(
            "ALTER TABLE {} RENAME TO {}",
            quote(&join_table_name(model, old_name)),
            quote(&join_table_name(model, new_name))
        )],
    }
}

/// Statements that perform one applied operation.
///
/// # Errors
///
/// Returns [`MigrationError::Storage`] for alterations with no column
/// equivalent, such as turning a column into a many-to-many relation.
pub fn statements(operation: &AppliedOperation) -> Result<Vec<String>, MigrationError> {
    Ok(match operation {
        AppliedOperation::CreateModel { model } => create_model(model),
        AppliedOperation::DeleteModel { model } => delete_model(model),
        AppliedOperation::AddField {
            model, name, field, ..
        } => add_field(model, name, field),
        AppliedOperation::RemoveField {
            model,
            name,
            previous,
            ..
        } => remove_field(model, name, previous),
        AppliedOperation::AlterField {
            model,
            name,
            previous,
            field,
        } => alter_field(model, name, previous, field)?,
        AppliedOperation::RenameField {
            model,
            old_name,
            new_name,
            field,
        } => rename_field(model, old_name, new_name, field),
    })
}

/// Pre-flight query for an alteration that introduces or changes bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCheck {
    /// `SELECT COUNT(*)` of rows outside the new bounds
    pub sql: String,
    /// Altered model
    pub model: ModelKey,
    /// Altered field
    pub field: String,
    /// Lower bound, `-inf` if none
    pub min: f64,
    /// Upper bound, `inf` if none
    pub max: f64,
}

/// Query counting existing rows that would violate bounds an alteration
/// introduces.
#[must_use]
pub fn bound_check(operation: &AppliedOperation) -> Option<BoundCheck> {
    let AppliedOperation::AlterField {
        model,
        name,
        previous,
        field,
    } = operation
    else {
        return None;
    };
    if previous.validators == field.validators {
        return None;
    }

    let column = column_name(name, field)?;
    let predicate = range_predicate(&column, field)?;
    let (min, max) = bounds(&field.validators);

    Some(BoundCheck {
        sql: format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NOT NULL AND NOT ({predicate})",
            quote(&model.table_name()),
            quote(&column)
        ),
        model: model.clone(),
        field: name.clone(),
        min: min.unwrap_or(f64::NEG_INFINITY),
        max: max.unwrap_or(f64::INFINITY),
    })
}

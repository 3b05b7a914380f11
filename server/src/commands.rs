//! Text output of the `nest` CLI commands.

use nest_core::migrator::{MigrationPlan, MigrationReport, MigrationStatus};
use std::fmt::Write;

/// `showmigrations` listing: migrations grouped by app, `[X]` when applied.
#[must_use]
pub fn render_status(statuses: &[MigrationStatus]) -> String {
    let mut by_app: Vec<(&str, Vec<&MigrationStatus>)> = Vec::new();
    for status in statuses {
        match by_app.iter_mut().find(|(app, _)| *app == status.id.app) {
            Some((_, rows)) => rows.push(status),
            None => by_app.push((status.id.app.as_str(), vec![status])),
        }
    }
    by_app.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (app, rows) in by_app {
        let _ = writeln!(out, "{app}");
        for status in rows {
            let mark = if status.is_applied() { "X" } else { " " };
            let _ = writeln!(out, " [{mark}] {}", status.id.name);
        }
    }
    out
}

/// `migrate --plan` listing.
#[must_use]
pub fn render_plan(plan: &MigrationPlan) -> String {
    if plan.is_empty() {
        return "  No planned migration operations.\n".to_string();
    }

    let mut out = String::new();
    for step in &plan.steps {
        let _ = writeln!(out, "{} ({})", step.id, step.direction.as_str());
        for operation in &step.operations {
            let _ = writeln!(out, "    {operation}");
        }
    }
    out
}

/// Summary printed after `migrate`.
#[must_use]
pub fn render_report(report: &MigrationReport) -> String {
    if report.is_empty() {
        return "  No migrations to apply.\n".to_string();
    }

    let mut out = String::new();
    for id in &report.applied {
        let _ = writeln!(out, "  Applying {id}... OK");
    }
    for id in &report.unapplied {
        let _ = writeln!(out, "  Unapplying {id}... OK");
    }
    out
}

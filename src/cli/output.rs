//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::backend::Action;
use crate::planner::{ExecutionResult, PendingChange};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Secret")]
    spec: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Change")]
    preview: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats pending changes for display.
    #[must_use]
    pub fn format_plan(&self, changes: &[PendingChange], fingerprint: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::new(changes, fingerprint)),
            OutputFormat::Text => Self::format_plan_text(changes, fingerprint),
        }
    }

    fn format_plan_text(changes: &[PendingChange], fingerprint: &str) -> String {
        if changes.is_empty() {
            return format!("{} No changes. Every secret is up to date.\n", "✓".green());
        }

        let mut output = String::new();
        output.push_str("\nSync Plan\n");
        let _ = write!(output, "   Config fingerprint: {fingerprint}\n\n");

        let rows: Vec<ChangeRow> = changes
            .iter()
            .enumerate()
            .map(|(i, c)| ChangeRow {
                index: i + 1,
                spec: c.spec.clone(),
                action: Self::format_action(c.action()),
                preview: c.preview(),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let created = changes.iter().filter(|c| c.action() == Action::Create).count();
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update\n",
            created.to_string().green(),
            (changes.len() - created).to_string().yellow()
        );

        output
    }

    /// Formats the result of an apply run.
    #[must_use]
    pub fn format_result(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ResultJson {
                created: result.created,
                updated: result.updated,
            }),
            OutputFormat::Text => format!("{} {result}\n", "✓".green()),
        }
    }

    /// Formats the result of `validate`.
    #[must_use]
    pub fn format_validated(&self, count: usize) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "valid": true, "secrets": count })),
            OutputFormat::Text => format!("{} {count} secret(s) valid\n", "✓".green()),
        }
    }

    /// Formats a fatal error.
    #[must_use]
    pub fn format_error(&self, error: &crate::error::SyncError) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "error": error.to_string() })),
            OutputFormat::Text => format!("{} {error}", "Error:".red().bold()),
        }
    }

    fn format_action(action: Action) -> String {
        match action {
            Action::Create => "+ create".green().to_string(),
            Action::Update => "~ update".yellow().to_string(),
        }
    }
}

fn to_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// ============================================================================
// JSON Output Types
// ============================================================================

#[derive(Serialize)]
struct PlanJson {
    fingerprint: String,
    changes: Vec<ChangeJson>,
}

#[derive(Serialize)]
struct ChangeJson {
    secret: String,
    action: Action,
    preview: String,
}

impl PlanJson {
    fn new(changes: &[PendingChange], fingerprint: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            changes: changes
                .iter()
                .map(|c| ChangeJson {
                    secret: c.spec.clone(),
                    action: c.action(),
                    preview: c.preview(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ResultJson {
    created: usize,
    updated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockPlan;

    fn change(spec: &str, action: Action, preview: &str) -> PendingChange {
        let mut plan = MockPlan::new();
        plan.expect_preview().return_const(preview.to_string());
        plan.expect_action().return_const(action);
        PendingChange {
            spec: spec.to_string(),
            plan: Box::new(plan),
        }
    }

    #[test]
    fn test_empty_plan_text() {
        colored::control::set_override(false);
        let out = OutputFormatter::new(OutputFormat::Text).format_plan(&[], "abcd1234");
        assert!(out.contains("No changes"));
    }

    #[test]
    fn test_plan_text_lists_previews() {
        colored::control::set_override(false);
        let changes = vec![
            change("env", Action::Create, "file \".env\" will be created"),
            change("token", Action::Update, "secret \"TOKEN\" in octo/app will be updated"),
        ];

        let out = OutputFormatter::new(OutputFormat::Text).format_plan(&changes, "abcd1234");

        assert!(out.contains("abcd1234"));
        assert!(out.contains("file \".env\" will be created"));
        assert!(out.contains("Plan: 1 to create, 1 to update"));
    }

    #[test]
    fn test_plan_json() {
        let changes = vec![change("db", Action::Update, "update AWS Secrets Manager secret arn:x")];

        let out = OutputFormatter::new(OutputFormat::Json).format_plan(&changes, "abcd1234");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");

        assert_eq!(value["fingerprint"], "abcd1234");
        assert_eq!(value["changes"][0]["secret"], "db");
        assert_eq!(value["changes"][0]["action"], "update");
    }

    #[test]
    fn test_result_json() {
        let result = ExecutionResult {
            created: 1,
            updated: 2,
        };
        let out = OutputFormatter::new(OutputFormat::Json).format_result(&result);
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["updated"], 2);
    }
}

//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ClusterConfig, ValidationResult};
use crate::planner::{ActionType, ExecutionResult, Plan};
use crate::reconciler::{VersionDiff, VersionList};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Changes")]
    changes: usize,
}

/// Version row for table display.
#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Version")]
    version: i32,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Nodes")]
    nodes: i64,
}

/// A plan entry flattened for display.
struct PlanEntry<'p> {
    action: ActionType,
    kind: &'static str,
    resource: String,
    changes: &'p [String],
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(plan),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\nPlan for cluster {}\n", plan.cluster.name.bold());

        let entries = Self::plan_entries(plan);
        let changed: Vec<&PlanEntry<'_>> = entries.iter().filter(|e| e.action != ActionType::Noop).collect();

        if changed.is_empty() {
            let _ = writeln!(output, "{} No changes required - cluster is up to date.", "✓".green());
        } else {
            let rows: Vec<PlanActionRow> = changed
                .iter()
                .map(|e| PlanActionRow {
                    action: Self::format_action_type(e.action),
                    kind: e.kind,
                    resource: Self::truncate(&e.resource, 40),
                    changes: e.changes.len(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');

            for entry in &changed {
                if entry.changes.is_empty() {
                    continue;
                }
                let _ = writeln!(
                    output,
                    "\n{} {} {}",
                    Self::format_action_type(entry.action),
                    entry.kind,
                    entry.resource.bold()
                );
                for change in entry.changes {
                    let _ = writeln!(output, "    {change}");
                }
            }

            let _ = writeln!(
                output,
                "\nPlan: {} to create, {} to update, {} to recreate, {} skipped",
                plan.count(ActionType::Create).to_string().green(),
                plan.count(ActionType::Update).to_string().yellow(),
                plan.count(ActionType::Recreate).to_string().red(),
                plan.count(ActionType::Skip).to_string().dimmed()
            );
        }

        if !plan.warnings.is_empty() {
            let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
            for warning in &plan.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        output
    }

    fn plan_entries(plan: &Plan) -> Vec<PlanEntry<'_>> {
        let mut entries = vec![PlanEntry {
            action: plan.cluster_action.action,
            kind: "cluster",
            resource: plan.cluster.name.clone(),
            changes: &plan.cluster_action.changes,
        }];
        entries.extend(plan.asg_actions.iter().map(|a| PlanEntry {
            action: a.action,
            kind: "auto-scaling group",
            resource: a.name.clone(),
            changes: &a.changes,
        }));
        entries.extend(plan.lb_actions.iter().map(|l| PlanEntry {
            action: l.action,
            kind: "load balancer",
            resource: format!("{}/{}", l.asg_name, l.name),
            changes: &l.changes,
        }));
        entries.extend(plan.app_actions.iter().map(|a| PlanEntry {
            action: a.action,
            kind: "application",
            resource: a.name.clone(),
            changes: &a.changes,
        }));
        entries
    }

    /// Formats the outcome of an apply.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(result),
            OutputFormat::Text => format!("{} {result}\n", "✓".green()),
        }
    }

    /// Formats the version list of an application.
    #[must_use]
    pub fn format_versions(&self, list: &VersionList) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(list),
            OutputFormat::Text => {
                if list.versions.is_empty() {
                    return format!("{list}\n");
                }
                let mut output = format!("\nVersions of {}\n\n", list.application_name.bold());
                let rows: Vec<VersionRow> = list
                    .versions
                    .iter()
                    .map(|v| VersionRow {
                        marker: if v.is_active { "*" } else { "" },
                        version: v.version,
                        created: v.created.format("%Y-%m-%d %H:%M:%S").to_string(),
                        image: Self::truncate(&v.image, 48),
                        nodes: v.active_nodes,
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                let active = list
                    .active_version
                    .map_or_else(|| "none".dimmed().to_string(), |v| v.to_string().green().to_string());
                let _ = writeln!(output, "\nActive version: {active}");
                output
            }
        }
    }

    /// Formats the differences between two versions.
    #[must_use]
    pub fn format_version_diff(&self, diff: &VersionDiff) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(diff),
            OutputFormat::Text => {
                let mut output = format!(
                    "\n{}: version {} -> {}\n\n",
                    diff.application_name.bold(),
                    diff.from,
                    diff.to
                );
                if diff.changes.is_empty() {
                    let _ = writeln!(output, "{} No differences", "✓".green());
                }
                for change in &diff.changes {
                    let _ = writeln!(output, "   {} {change}", "~".yellow());
                }
                if diff.has_secret_env {
                    let _ = writeln!(output, "\n{} Secret environment variable values cannot be compared", "⚠".yellow());
                }
                if diff.has_registry_password {
                    let _ = writeln!(output, "{} Registry passwords cannot be compared", "⚠".yellow());
                }
                output
            }
        }
    }

    /// Formats the result of an activation.
    #[must_use]
    pub fn format_activation(&self, application: &str, version: i32) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(&serde_json::json!({
                "application": application,
                "activatedVersion": version,
            })),
            OutputFormat::Text => format!("{} Activated {application} version {version}\n", "✓".green()),
        }
    }

    /// Formats a configuration validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let errors: Vec<_> = result
                    .errors
                    .iter()
                    .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                    .collect();
                Self::to_json(&serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": errors,
                    "warnings": result.warnings,
                }))
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!("{} Configuration has {} error(s)\n", "✗".red(), result.error_count())
                };
                for error in &result.errors {
                    let _ = writeln!(output, "   - {}: {}", error.field.bold(), error.message);
                }
                if show_warnings {
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   {} {warning}", "⚠".yellow());
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "   {} warning(s), use --warnings to show them",
                        result.warning_count()
                    );
                }
                output
            }
        }
    }

    /// Formats a dumped cluster configuration.
    ///
    /// Text output is the YAML document itself.
    #[must_use]
    pub fn format_config(&self, config: &ClusterConfig, yaml: &str) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(config),
            OutputFormat::Text => yaml.to_string(),
        }
    }

    /// Formats an error for display on stderr.
    #[must_use]
    pub fn format_error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => Self::to_json(&serde_json::json!({ "status": "error", "message": message })),
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }

    fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats an action type with color.
    fn format_action_type(action: ActionType) -> String {
        match action {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Recreate => "-/+recreate".red().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::Skip => "?skip".dimmed().to_string(),
            ActionType::Noop => "noop".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

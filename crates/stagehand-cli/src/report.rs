//! Table and JSON rendering of command results.

use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;
use console::style;

use stagehand_core::error::WorkflowError;
use stagehand_core::health::HealthReport;
use stagehand_core::state::WorkflowState;
use stagehand_core::types::HealthStatus;
use stagehand_core::workflow::WorkflowResult;
use stagehand_core::workspace::{DependencyReport, ValidationResult, WorkspaceResult};

use crate::terminal::{print_error, print_hint, print_step, print_success, print_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn error_json(err: &WorkflowError) -> serde_json::Value {
    serde_json::json!({
        "message": err.to_string(),
        "suggestions": err.suggestions(),
    })
}

pub fn print_errors(errors: &[WorkflowError]) {
    for err in errors {
        print_error(&err.to_string());
        for suggestion in err.suggestions() {
            print_hint(&suggestion);
        }
    }
}

pub fn print_workflow_result(
    result: &WorkflowResult,
    state_file: &Path,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for step in &result.steps_completed {
                println!("  {} {}", style("✓").green(), step);
            }
            if let Some(health) = &result.health {
                println!();
                print_health_table(health);
            }
            if let Some(workspace) = &result.workspace
                && let Some(path) = workspace.path()
            {
                let verb = if workspace.created {
                    "Created"
                } else if workspace.converted {
                    "Converted"
                } else {
                    "Using"
                };
                println!();
                print_step(&format!("{verb} workspace {}", path.display()));
                if let Some(deps) = &workspace.dependencies {
                    print_dependency_lines(deps);
                }
            }
            println!();

            if result.success {
                print_success(&format!(
                    "Installation completed in {:.1}s",
                    result.elapsed.as_secs_f64()
                ));
            } else if result.interrupted {
                print_warn("Installation interrupted; progress was saved.");
                println!("  State: {}", state_file.display());
                println!("  Continue with: {}", style("stagehand resume").bold());
            } else {
                print_errors(&result.errors);
                eprintln!("   State: {}", state_file.display());
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "success": result.success,
                "interrupted": result.interrupted,
                "exit_code": result.exit_code(),
                "steps_completed": result.steps_completed,
                "workspace_created": result.workspace_created,
                "elapsed_ms": result.elapsed.as_millis() as u64,
                "errors": result.errors.iter().map(error_json).collect::<Vec<_>>(),
                "health": result.health,
                "workspace": result.workspace,
                "state_file": (!result.success).then(|| state_file.display().to_string()),
            });
            print_json(&output)?;
        }
    }
    Ok(())
}

fn status_label(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => style(status).green().to_string(),
        HealthStatus::Degraded => style(status).yellow().to_string(),
        HealthStatus::Unhealthy => style(status).red().bold().to_string(),
    }
}

fn print_health_table(report: &HealthReport) {
    println!(
        "Health of {}: {}",
        style(report.component).bold(),
        status_label(report.overall)
    );
    println!(
        "  {:<14} {:<40} {:<10} {:>8} {:>8}",
        "Facet", "Target", "Status", "Latency", "Attempts"
    );
    println!("  {}", "-".repeat(84));
    for facet in &report.facets {
        let latency = facet
            .latency_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        // Pad before styling; escape codes would break the column widths.
        let status = format!("{:<10}", facet.status);
        let status = match facet.status {
            HealthStatus::Healthy => style(status).green(),
            HealthStatus::Degraded => style(status).yellow(),
            HealthStatus::Unhealthy => style(status).red(),
        };
        println!(
            "  {:<14} {:<40} {} {:>8} {:>8}{}",
            facet.facet,
            facet.target,
            status,
            latency,
            facet.attempts,
            if facet.recovered { " (recovered)" } else { "" }
        );
        if let Some(detail) = &facet.detail {
            println!("  {:<14} {}", "", style(detail).dim());
        }
    }
    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &report.recommendations {
            println!("  - {recommendation}");
        }
    }
}

pub fn print_health(report: &HealthReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            print_health_table(report);
            Ok(())
        }
        OutputFormat::Json => print_json(&serde_json::to_value(report)?),
    }
}

pub fn print_validation(path: &Path, result: &ValidationResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if result.is_valid {
                print_success(&format!("{} is a valid workspace", path.display()));
                return Ok(());
            }
            print_warn(&format!(
                "{} is not a complete workspace ({:.0}% confidence)",
                path.display(),
                result.confidence * 100.0
            ));
            for missing in &result.missing_files {
                println!("  missing: {}", missing.display());
            }
            for invalid in &result.invalid_configs {
                println!("  invalid: {} ({})", invalid.file.display(), invalid.error);
            }
            for suggestion in &result.suggestions {
                print_hint(suggestion);
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&serde_json::to_value(result)?),
    }
}

fn print_dependency_lines(report: &DependencyReport) {
    if report.is_satisfied() {
        println!("  All declared dependencies are available.");
        return;
    }
    println!("  Missing dependencies:");
    for dep in &report.missing_services {
        println!("    - {} ({})", style(&dep.name).bold(), dep.install_hint);
    }
}

pub fn print_dependencies(path: &Path, report: &DependencyReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            print_step(&format!("Dependencies of {}", path.display()));
            print_dependency_lines(report);
            Ok(())
        }
        OutputFormat::Json => print_json(&serde_json::to_value(report)?),
    }
}

pub fn print_initialized(result: &WorkspaceResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            print_success(&format!(
                "Created workspace '{}' at {}",
                result.name,
                result.path.display()
            ));
            Ok(())
        }
        OutputFormat::Json => print_json(&serde_json::to_value(result)?),
    }
}

pub fn print_state(state: Option<&WorkflowState>, state_file: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let Some(state) = state else {
                println!("No installation in progress.");
                return Ok(());
            };
            println!("Installation of {}", style(state.component).bold());
            println!("  Current step: {}", state.current_step);
            println!("  Started:      {}", state.started_at.to_rfc3339());
            println!("  Updated:      {}", state.updated_at.to_rfc3339());
            for step in state.completed_steps() {
                println!("  {} {}", style("✓").green(), step);
            }
            for step in state.failed_steps() {
                println!("  {} {}", style("✗").red(), step);
            }
            println!("  State file:   {}", state_file.display());
            println!();
            println!(
                "Continue with {} or discard with {}",
                style("stagehand resume").bold(),
                style("stagehand reset").bold()
            );
            Ok(())
        }
        OutputFormat::Json => print_json(&serde_json::to_value(state)?),
    }
}

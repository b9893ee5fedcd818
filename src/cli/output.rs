//! CLI output formatting

use crate::agent::AgentMetadata;
use crate::core::AgentStatus;
use crate::execution::{HookEvent, RunReport};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Lines of agent output shown in a run summary
pub const SUMMARY_OUTPUT_LINES: usize = 10;

/// Format an agent status for display
pub fn format_status(status: AgentStatus) -> String {
    match status {
        AgentStatus::Initializing => style("INITIALIZING").dim().to_string(),
        AgentStatus::Running => style("RUNNING").yellow().to_string(),
        AgentStatus::Completed => style("COMPLETED").green().to_string(),
        AgentStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a hook event for display
///
/// Pre-iteration events are too chatty to print and yield `None`.
pub fn format_hook_event(event: &HookEvent<'_>) -> Option<String> {
    let line = match event {
        HookEvent::PrePipeline { agent, .. } => {
            format!("{} Starting {}", ROCKET, style(agent).bold())
        }
        HookEvent::PreIteration { .. } => return None,
        HookEvent::PostIteration { agent, state, result } => {
            let icon = match result.status {
                AgentStatus::Failed => CROSS,
                AgentStatus::Completed => CHECK,
                _ => SPINNER,
            };
            format!(
                "{} {} #{}: {}",
                icon,
                style(agent).cyan(),
                state.iteration(),
                style(&result.message).dim()
            )
        }
        HookEvent::OnError { agent, error, .. } => {
            format!("{} {}: {}", CROSS, style(agent).red(), style(error).dim())
        }
        HookEvent::OnTerminal { agent, reason, .. } => {
            format!("{} {} stopped: {}", INFO, style(agent).bold(), style(reason).dim())
        }
        HookEvent::PostPipeline { agent, state, .. } => {
            format!(
                "{} {} finished after {} iterations",
                INFO,
                style(agent).bold(),
                state.iteration()
            )
        }
    };
    Some(line)
}

/// One-paragraph summary of a run report
pub fn format_report_summary(report: &RunReport) -> String {
    let status = &report.pipeline_status;
    let mut lines = vec![
        format!("  Status: {}", format_status(status.final_status)),
        format!("  Iterations: {}", style(status.total_iterations).cyan()),
        format!("  Duration: {}", style(format!("{:.2}s", status.duration_seconds)).dim()),
    ];

    if let Some(output) = report.final_state.get("last_output").and_then(|v| v.as_str()) {
        let output = output.trim_end();
        if !output.is_empty() {
            lines.push("  Output:".to_string());
            lines.push(format_output(output, SUMMARY_OUTPUT_LINES));
        }
    }

    for warning in &status.warnings {
        lines.push(format!("  {}{}", WARN, style(warning).yellow()));
    }
    for error in &status.errors {
        lines.push(format!("  {}{}", CROSS, style(error).red()));
    }
    if let Some(error) = &report.pipeline_error {
        lines.push(format!("  {}{}", CROSS, style(error).red()));
    }

    lines.join("\n")
}

/// Format a registered agent type for display
pub fn format_agent_metadata(metadata: &AgentMetadata) -> String {
    let mut line = format!(
        "  {} {} - {}",
        style(&metadata.agent_type).bold(),
        style(format!("v{}", metadata.version)).dim(),
        metadata.description
    );
    if !metadata.tags.is_empty() {
        line.push_str(&format!(" [{}]", style(metadata.tags.join(", ")).cyan()));
    }
    line
}

/// Format command output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

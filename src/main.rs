use agentic_pipeline::agent::AgentRegistry;
use agentic_pipeline::cli::commands::{AgentsCommand, RunCommand, ValidateCommand};
use agentic_pipeline::cli::output::*;
use agentic_pipeline::cli::{Cli, Command};
use agentic_pipeline::core::PredicateRegistry;
use agentic_pipeline::execution::{HookPoint, HookRegistry, Pipeline};
use agentic_pipeline::workflow::WorkflowDefinition;

use anyhow::{Context, Result};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

const HOOK_POINTS: [HookPoint; 5] = [
    HookPoint::PrePipeline,
    HookPoint::PostIteration,
    HookPoint::OnError,
    HookPoint::OnTerminal,
    HookPoint::PostPipeline,
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let registry = AgentRegistry::with_builtins();
    let predicates = PredicateRegistry::new();

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, &registry, &predicates).await?,
        Command::Validate(cmd) => validate_workflow(cmd, &registry, &predicates)?,
        Command::Agents(cmd) => list_agents(cmd, &registry)?,
    }

    Ok(())
}

/// Console printer attached to every pipeline of the run
fn console_hooks() -> HookRegistry {
    let mut hooks = HookRegistry::new();
    for point in HOOK_POINTS {
        hooks.add_hook(point, |event| {
            if let Some(line) = format_hook_event(event) {
                println!("{}", line);
            }
            Ok(())
        });
    }
    hooks
}

async fn run_workflow(
    cmd: &RunCommand,
    registry: &AgentRegistry,
    predicates: &PredicateRegistry,
) -> Result<()> {
    let definition = WorkflowDefinition::from_file(&cmd.file)
        .with_context(|| format!("Failed to load workflow {}", cmd.file.display()))?;

    println!(
        "{} Loaded workflow: {} ({}, {} steps)",
        INFO,
        style(&definition.name).bold(),
        definition.mode,
        style(definition.steps.len()).cyan()
    );

    let mut workflow = definition
        .build(registry, predicates)
        .context("Failed to build workflow")?
        .with_step_hooks(console_hooks());

    println!();
    let report = Pipeline::new(&mut workflow)
        .with_hooks(console_hooks())
        .run(cmd.run_context())
        .await;

    if let Some(path) = &cmd.output {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("\n{} Report written to {}", INFO, style(path.display()).dim());
    }

    if cmd.json {
        println!("\n{}", report.to_json()?);
    }

    println!("\n{}", format_report_summary(&report));

    if report.is_success() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&definition.name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&definition.name).bold(),
            style("failed").red()
        );
        if let Some(last) = report.pipeline_status.errors.last() {
            error!("{}", last);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_workflow(
    cmd: &ValidateCommand,
    registry: &AgentRegistry,
    predicates: &PredicateRegistry,
) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let definition = match WorkflowDefinition::from_file(&cmd.file) {
        Ok(definition) => definition,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    };

    let errors = definition.validate(registry, predicates);
    if !errors.is_empty() {
        println!("{} Validation failed:", CROSS);
        for error in &errors {
            println!("  {}", style(error).red());
        }
        std::process::exit(1);
    }

    println!("{} Workflow definition is valid!", CHECK);
    println!("  Name: {}", style(&definition.name).bold());
    println!("  Mode: {}", style(definition.mode).cyan());
    println!("  Steps: {}", style(definition.steps.len()).cyan());

    if cmd.json {
        println!("\n{}", definition.to_json()?);
    }
    Ok(())
}

fn list_agents(cmd: &AgentsCommand, registry: &AgentRegistry) -> Result<()> {
    let agents = registry.list(cmd.tag.as_deref());

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!("{} No agent types registered", INFO);
        return Ok(());
    }

    println!("{} Registered agent types:", INFO);
    for metadata in agents {
        println!("{}", format_agent_metadata(metadata));
        for (key, spec) in &metadata.parameters {
            let required = if spec.required { "required" } else { "optional" };
            println!("      {} ({:?}, {})", key, spec.kind, style(required).dim());
        }
    }
    Ok(())
}

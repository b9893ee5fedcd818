//! CLI command definitions

use crate::core::RunContext;
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML or JSON file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Context values handed to the workflow (key=value, values may be JSON)
    #[arg(long, value_parser = parse_key_value)]
    pub context: Vec<(String, Value)>,

    /// Write the run report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    /// Context built from the `--context` assignments
    pub fn run_context(&self) -> RunContext {
        let mut context = RunContext::new();
        for (key, value) in &self.context {
            context.set(key.clone(), value.clone());
        }
        context
    }
}

/// Validate a workflow definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML or JSON file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List registered agent types
#[derive(Debug, Args, Clone)]
pub struct AgentsCommand {
    /// Only show agent types with this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    RunContext::parse_assignment(s).ok_or_else(|| format!("Invalid key=value pair: {}", s))
}

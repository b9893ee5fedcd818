//! Scenario-based tests for agentic-pipeline


mod error_recovery;
mod hooks;
mod iteration_bounds;
mod sequential_workflow;
mod state_history;
mod workflow_definitions;

//! Agent capability contract
//!
//! An [`Agent`] is driven by a [`Pipeline`](crate::execution::Pipeline)
//! through `initialize`, zero or more `execute_iteration` calls, and
//! `finalize`. Iteration side effects flow only through the returned
//! [`AgentResult::data`], so the pipeline's snapshot history stays
//! authoritative.

pub mod command;
pub mod registry;
pub mod result;

use crate::core::{AgentConfig, AgentState, RunContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub use command::{CommandAgent, CommandParams, OutputPattern};
pub use registry::{AgentMetadata, AgentRegistry, ParameterSpec, RegistryError};
pub use result::{AgentError, AgentResult};

/// Whether an agent does work itself or delegates to other agents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Leaf,
    Composite,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Leaf => "leaf",
            AgentKind::Composite => "composite",
        }
    }
}

/// Trait for iterative agents
#[async_trait]
pub trait Agent: Send {
    /// Configuration owned by this agent
    fn config(&self) -> &AgentConfig;

    /// Mutable configuration, used for per-step iteration overrides
    fn config_mut(&mut self) -> &mut AgentConfig;

    fn kind(&self) -> AgentKind {
        AgentKind::Leaf
    }

    fn name(&self) -> &str {
        &self.config().name
    }

    fn agent_type(&self) -> &str {
        &self.config().agent_type
    }

    /// Called once before the first iteration
    async fn initialize(&mut self, context: &RunContext) -> Result<(), AgentError>;

    /// Run one iteration against the current state
    async fn execute_iteration(&mut self, state: &AgentState) -> Result<AgentResult, AgentError>;

    /// Whether the agent considers its work done
    ///
    /// Informational, for callers driving the agent without a pipeline.
    fn check_terminal_condition(&self, state: &AgentState) -> bool;

    /// Called once after the last iteration, returns the agent's result bundle
    fn finalize(&mut self, state: &AgentState) -> Result<Map<String, Value>, AgentError> {
        Ok(base_results(self, state))
    }

    fn pre_iteration_hook(&mut self, _state: &AgentState) {}

    fn post_iteration_hook(&mut self, _state: &AgentState, _result: &AgentResult) {}

    /// Recovery point for an iteration that returned an error
    ///
    /// The default gives up: a terminal failed result.
    fn on_error(&mut self, error: &AgentError, state: &AgentState) -> AgentResult {
        AgentResult::failed(
            format!("Iteration {} failed: {}", state.iteration() + 1, error),
            error.to_string(),
        )
    }
}

/// Result bundle every agent reports: name, type, iteration count and final data
pub fn base_results<A: Agent + ?Sized>(agent: &A, state: &AgentState) -> Map<String, Value> {
    let mut results = Map::new();
    results.insert("agent_name".to_string(), json!(agent.name()));
    results.insert("agent_type".to_string(), json!(agent.agent_type()));
    results.insert("iterations".to_string(), json!(state.iteration()));
    results.insert("final_state".to_string(), Value::Object(state.data().clone()));
    results
}

//! Fluent workflow builder

use crate::agent::AgentRegistry;
use crate::core::PredicateRegistry;
use crate::execution::{CompositeAgent, WorkflowMode};
use crate::workflow::definition::{GuardSpec, StepDefinition, WorkflowDefinition};
use crate::workflow::WorkflowError;
use serde_json::{Map, Value};

/// Builds a [`WorkflowDefinition`] step by step
///
/// ```
/// use agentic_pipeline::workflow::{GuardSpec, WorkflowBuilder};
/// use agentic_pipeline::execution::WorkflowMode;
/// use serde_json::json;
///
/// let definition = WorkflowBuilder::new("ci")
///     .mode(WorkflowMode::Conditional)
///     .global_param("timeout_secs", 120)
///     .then("command", "build", json!({"command": "make"}))
///     .if_condition(GuardSpec::equals("build_ready", true), "command", "test", json!({"command": "make", "args": ["test"]}))
///     .into_definition();
///
/// assert_eq!(definition.steps.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: WorkflowDefinition::new(name),
        }
    }

    /// Continue from an existing definition
    pub fn from_definition(definition: WorkflowDefinition) -> Self {
        Self { definition }
    }

    pub fn mode(mut self, mode: WorkflowMode) -> Self {
        self.definition.mode = mode;
        self
    }

    /// Merge parameters shared by every step
    pub fn global_config(mut self, config: Map<String, Value>) -> Self {
        self.definition.global_config.extend(config);
        self
    }

    pub fn global_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.definition.global_config.insert(key.into(), value.into());
        self
    }

    /// Iteration bound of the composite itself
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.definition.max_iterations = Some(max_iterations);
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.definition.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Append a fully described step
    pub fn add_agent(mut self, step: StepDefinition) -> Self {
        self.definition.steps.push(step);
        self
    }

    /// Append an unguarded step; `params` must be a JSON object or null
    pub fn then(self, agent_type: impl Into<String>, name: impl Into<String>, params: Value) -> Self {
        self.add_agent(with_params(StepDefinition::new(agent_type, name), params))
    }

    /// Append a guarded step
    pub fn if_condition(
        self,
        guard: GuardSpec,
        agent_type: impl Into<String>,
        name: impl Into<String>,
        params: Value,
    ) -> Self {
        self.add_agent(with_params(StepDefinition::new(agent_type, name), params).when(guard))
    }

    /// Route the most recently added step
    pub fn routes(mut self, on_success: Option<&str>, on_failure: Option<&str>) -> Self {
        if let Some(step) = self.definition.steps.last_mut() {
            step.on_success = on_success.map(str::to_string);
            step.on_failure = on_failure.map(str::to_string);
        }
        self
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn into_definition(self) -> WorkflowDefinition {
        self.definition
    }

    /// Validate and build the composite agent
    pub fn build(
        &self,
        registry: &AgentRegistry,
        predicates: &PredicateRegistry,
    ) -> Result<CompositeAgent, WorkflowError> {
        self.definition.build(registry, predicates)
    }
}

fn with_params(mut step: StepDefinition, params: Value) -> StepDefinition {
    if let Value::Object(map) = params {
        step.config = map;
    }
    step
}

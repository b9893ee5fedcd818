//! Composite agent - runs other agents as workflow steps
//!
//! Each composite iteration delegates to one [`Step`], driving the step's
//! agent through its own nested [`Pipeline`]. A completed step's final state
//! is handed back to the composite's run under `{step}_result`; that is the
//! only data crossing between steps.

use crate::agent::{base_results, Agent, AgentError, AgentKind, AgentResult};
use crate::core::{AgentConfig, AgentState, AgentStatus, RunContext, Step};
use crate::execution::hooks::{HookLibrary, HookRegistry};
use crate::execution::pipeline::{Pipeline, RunReport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Registry type identifier of composite agents
pub const COMPOSITE_AGENT_TYPE: &str = "composite";

/// How a composite picks the step for each iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Steps run to completion in list order; a failure stops the workflow
    #[default]
    Sequential,
    /// The first pending step whose guard passes runs next
    Conditional,
    /// One step per iteration, cycling through the list
    Loop,
}

impl WorkflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::Sequential => "sequential",
            WorkflowMode::Conditional => "conditional",
            WorkflowMode::Loop => "loop",
        }
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(WorkflowMode::Sequential),
            "conditional" => Ok(WorkflowMode::Conditional),
            "loop" => Ok(WorkflowMode::Loop),
            other => Err(format!("Unknown workflow mode: {}", other)),
        }
    }
}

/// What one nested run produced
struct StepOutcome {
    name: String,
    success: bool,
    on_success: Option<String>,
    on_failure: Option<String>,
    report: RunReport,
}

impl StepOutcome {
    fn output(&self) -> Value {
        Value::Object(self.report.final_state.data().clone())
    }

    fn error(&self) -> String {
        if let Some(error) = &self.report.pipeline_error {
            return format!("Step {} failed: {}", self.name, error);
        }
        match self.report.pipeline_status.errors.last() {
            Some(error) => format!("Step {} failed: {}", self.name, error),
            None => format!("Step {} failed", self.name),
        }
    }
}

/// Agent orchestrating an ordered list of steps
pub struct CompositeAgent {
    config: AgentConfig,
    mode: WorkflowMode,
    steps: Vec<Step>,
    cursor: usize,
    completed: Vec<String>,
    failed: Vec<String>,
    /// Failed conditional steps with no `on_failure` route
    unhandled: Vec<String>,
    failed_step: Option<String>,
    next_hint: Option<String>,
    step_results: Map<String, Value>,
    base_context: RunContext,
    step_hooks: HookRegistry,
    hook_library: HookLibrary,
}

impl CompositeAgent {
    /// Create an empty sequential composite
    pub fn new(mut config: AgentConfig) -> Self {
        if config.agent_type.is_empty() {
            config.agent_type = COMPOSITE_AGENT_TYPE.to_string();
        }
        Self {
            config,
            mode: WorkflowMode::default(),
            steps: Vec::new(),
            cursor: 0,
            completed: Vec::new(),
            failed: Vec::new(),
            unhandled: Vec::new(),
            failed_step: None,
            next_hint: None,
            step_results: Map::new(),
            base_context: RunContext::new(),
            step_hooks: HookRegistry::new(),
            hook_library: HookLibrary::new(),
        }
    }

    pub fn with_mode(mut self, mode: WorkflowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_mode(&mut self, mode: WorkflowMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> WorkflowMode {
        self.mode
    }

    /// Append a step
    pub fn add_step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Hooks attached to every nested step pipeline
    pub fn with_step_hooks(mut self, hooks: HookRegistry) -> Self {
        self.step_hooks = hooks;
        self
    }

    /// Named hooks available to step configurations
    pub fn with_hook_library(mut self, library: HookLibrary) -> Self {
        self.hook_library = library;
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::id).collect()
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed
    }

    pub fn failed_steps(&self) -> &[String] {
        &self.failed
    }

    /// Latest nested run report per step
    pub fn step_results(&self) -> &Map<String, Value> {
        &self.step_results
    }

    fn is_settled(&self, step_id: &str) -> bool {
        self.completed.iter().any(|s| s == step_id) || self.failed.iter().any(|s| s == step_id)
    }

    fn step_context(&self, state: &AgentState) -> RunContext {
        let mut context = self.base_context.clone();
        context.set("composite_state", Value::Object(state.data().clone()));
        context.set("completed_steps", json!(self.completed));
        context.set("workflow_mode", self.mode.as_str());
        context
    }

    /// Run step `index` to completion through a nested pipeline
    async fn run_step(&mut self, index: usize, state: &AgentState) -> StepOutcome {
        let context = self.step_context(state);
        let total = self.steps.len();
        let step = &mut self.steps[index];

        if let Some(max_iterations) = step.max_iterations {
            step.agent.config_mut().set_max_iterations(max_iterations);
        }

        let name = step.id().to_string();
        info!(
            "{}: executing step {}/{}: {} ({})",
            self.config.name,
            index + 1,
            total,
            name,
            step.agent.kind().as_str()
        );

        let report = Pipeline::new(step.agent.as_mut())
            .with_hooks(self.step_hooks.clone())
            .with_hook_library(self.hook_library.clone())
            .run(context)
            .await;

        let success = report.final_status() == AgentStatus::Completed;
        let outcome = StepOutcome {
            name,
            success,
            on_success: step.on_success.clone(),
            on_failure: step.on_failure.clone(),
            report,
        };
        self.record(&outcome);
        outcome
    }

    /// Keep only the latest outcome of each step
    fn record(&mut self, outcome: &StepOutcome) {
        let name = &outcome.name;
        let report = serde_json::to_value(&outcome.report)
            .unwrap_or_else(|e| json!({ "error": format!("unserializable report: {}", e) }));
        self.step_results.insert(name.clone(), report);

        self.completed.retain(|s| s != name);
        self.failed.retain(|s| s != name);
        if outcome.success {
            debug!("Step {} completed", name);
            self.completed.push(name.clone());
        } else {
            warn!("Step {} finished as {}", name, outcome.report.final_status());
            self.failed.push(name.clone());
        }
    }

    async fn execute_sequential(&mut self, state: &AgentState) -> AgentResult {
        if self.cursor >= self.steps.len() {
            return AgentResult::completed("All workflow steps completed")
                .with_data("completed_steps", json!(self.completed));
        }

        let outcome = self.run_step(self.cursor, state).await;
        if !outcome.success {
            self.failed_step = Some(outcome.name.clone());
            return AgentResult::failed(format!("Step {} failed", outcome.name), outcome.error())
                .with_data("failed_step", outcome.name.clone());
        }

        self.cursor += 1;
        let result = if self.cursor >= self.steps.len() {
            AgentResult::completed("All workflow steps completed")
        } else {
            AgentResult::running(format!("Step {} completed", outcome.name))
        };

        result
            .with_data(format!("{}_result", outcome.name), outcome.output())
            .with_data("current_step", self.cursor)
    }

    /// Pick the routed step if it is still eligible, else the first eligible one
    fn select_conditional(&mut self, state: &AgentState) -> Option<usize> {
        if let Some(hint) = self.next_hint.take() {
            let routed = self
                .steps
                .iter()
                .position(|step| step.id() == hint && !self.is_settled(&hint) && step.is_eligible(state));
            match routed {
                Some(index) => return Some(index),
                None => debug!("Route to '{}' not taken, scanning steps", hint),
            }
        }

        self.steps
            .iter()
            .position(|step| !self.is_settled(step.id()) && step.is_eligible(state))
    }

    async fn execute_conditional(&mut self, state: &AgentState) -> AgentResult {
        let Some(index) = self.select_conditional(state) else {
            let completed = json!(self.completed);
            if self.unhandled.is_empty() {
                return AgentResult::completed("Conditional workflow completed")
                    .with_data("completed_steps", completed);
            }
            let error = format!("Unhandled step failures: {}", self.unhandled.join(", "));
            return AgentResult::failed("Conditional workflow finished with failures", error)
                .with_data("completed_steps", completed)
                .with_data("failed_steps", json!(self.unhandled));
        };

        let outcome = self.run_step(index, state).await;
        if outcome.success {
            self.next_hint = outcome.on_success.clone();
            return AgentResult::running(format!("Step {} completed", outcome.name))
                .with_data(format!("{}_result", outcome.name), outcome.output());
        }

        match outcome.on_failure.clone() {
            Some(target) => {
                info!("Step {} failed, routing to {}", outcome.name, target);
                self.next_hint = Some(target);
            }
            None => {
                self.unhandled.push(outcome.name.clone());
                self.failed_step = Some(outcome.name.clone());
            }
        }

        AgentResult {
            status: AgentStatus::Failed,
            terminal: false,
            error: Some(outcome.error()),
            ..AgentResult::running(format!("Step {} failed", outcome.name))
        }
        .with_data("failed_step", outcome.name.clone())
    }

    async fn execute_loop(&mut self, state: &AgentState) -> AgentResult {
        let index = self.cursor % self.steps.len();
        self.cursor = (self.cursor + 1) % self.steps.len();

        let outcome = self.run_step(index, state).await;
        if outcome.success {
            return AgentResult::running(format!("Step {} completed", outcome.name))
                .with_data(format!("{}_result", outcome.name), outcome.output());
        }

        self.failed_step = Some(outcome.name.clone());
        AgentResult {
            status: AgentStatus::Failed,
            terminal: false,
            error: Some(outcome.error()),
            ..AgentResult::running(format!("Step {} failed", outcome.name))
        }
        .with_data("failed_step", outcome.name.clone())
    }
}

#[async_trait]
impl Agent for CompositeAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut AgentConfig {
        &mut self.config
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Composite
    }

    /// Reset bookkeeping; each step is initialized by its own nested pipeline
    async fn initialize(&mut self, context: &RunContext) -> Result<(), AgentError> {
        info!(
            "Initializing {} workflow {} with {} steps",
            self.mode,
            self.config.name,
            self.steps.len()
        );
        self.cursor = 0;
        self.completed.clear();
        self.failed.clear();
        self.unhandled.clear();
        self.failed_step = None;
        self.next_hint = None;
        self.step_results.clear();
        self.base_context = context.clone();
        Ok(())
    }

    async fn execute_iteration(&mut self, state: &AgentState) -> Result<AgentResult, AgentError> {
        if self.steps.is_empty() {
            return Ok(AgentResult::completed("No steps to execute"));
        }

        debug!("{}: composite iteration {}", self.config.name, state.iteration() + 1);
        let result = match self.mode {
            WorkflowMode::Sequential => self.execute_sequential(state).await,
            WorkflowMode::Conditional => self.execute_conditional(state).await,
            WorkflowMode::Loop => self.execute_loop(state).await,
        };
        Ok(result)
    }

    fn check_terminal_condition(&self, _state: &AgentState) -> bool {
        match self.mode {
            WorkflowMode::Sequential => self.cursor >= self.steps.len(),
            WorkflowMode::Conditional => self.steps.iter().all(|step| self.is_settled(step.id())),
            WorkflowMode::Loop => false,
        }
    }

    fn finalize(&mut self, state: &AgentState) -> Result<Map<String, Value>, AgentError> {
        let mut results = base_results(self, state);
        results.insert("workflow_mode".to_string(), json!(self.mode));
        results.insert("total_steps".to_string(), json!(self.steps.len()));
        results.insert("completed_steps".to_string(), json!(self.completed.len()));
        results.insert("failed_steps".to_string(), json!(self.failed.len()));
        results.insert("failed_step".to_string(), json!(self.failed_step));
        results.insert("step_names".to_string(), json!(self.step_names()));
        results.insert("step_results".to_string(), Value::Object(self.step_results.clone()));
        Ok(results)
    }
}

impl fmt::Debug for CompositeAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAgent")
            .field("name", &self.config.name)
            .field("mode", &self.mode)
            .field("steps", &self.steps)
            .field("cursor", &self.cursor)
            .field("completed", &self.completed)
            .field("failed", &self.failed)
            .finish()
    }
}

//! Pipeline - drives one agent through its lifecycle
//!
//! The run loop evaluates termination conditions before and after every
//! iteration, merges each result into the run's [`AgentState`], fires hooks
//! and collects status, timing and errors into a [`RunReport`]. A failed run
//! still produces a complete report.

use crate::agent::{Agent, AgentError, AgentResult};
use crate::core::{
    AgentState, AgentStatus, ConditionKind, PipelineStatus, RunContext, TerminationCondition,
};
use crate::execution::hooks::{HookEvent, HookFn, HookId, HookLibrary, HookPoint, HookRegistry, StopReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Status section of a [`RunReport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub total_iterations: usize,
    pub final_status: AgentStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<&PipelineStatus> for RunSummary {
    fn from(status: &PipelineStatus) -> Self {
        Self {
            run_id: status.run_id,
            started_at: status.started_at,
            completed_at: status.completed_at,
            duration_seconds: status.duration_seconds(),
            total_iterations: status.total_iterations,
            final_status: status.agent_status,
            errors: status.errors.clone(),
            warnings: status.warnings.clone(),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The agent's result bundle; `None` when the run aborted
    pub agent_results: Option<Map<String, Value>>,

    pub pipeline_status: RunSummary,

    /// State as it was when the run ended
    pub final_state: AgentState,

    /// Set when initialization or finalization failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_error: Option<String>,
}

impl RunReport {
    pub fn final_status(&self) -> AgentStatus {
        self.pipeline_status.final_status
    }

    pub fn is_success(&self) -> bool {
        self.final_status() == AgentStatus::Completed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs one agent to completion
pub struct Pipeline<'a> {
    agent: &'a mut dyn Agent,
    hooks: HookRegistry,
    library: HookLibrary,
    status: PipelineStatus,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline driving `agent`
    pub fn new(agent: &'a mut dyn Agent) -> Self {
        Self {
            agent,
            hooks: HookRegistry::new(),
            library: HookLibrary::new(),
            status: PipelineStatus::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Named hooks that the agent's configuration may reference
    pub fn with_hook_library(mut self, library: HookLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn add_hook<F>(&mut self, point: HookPoint, hook: F) -> HookId
    where
        F: Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.add_hook(point, hook)
    }

    pub fn add_shared_hook(&mut self, point: HookPoint, name: impl Into<String>, hook: HookFn) -> HookId {
        self.hooks.add_named(point, name, hook)
    }

    pub fn remove_hook(&mut self, id: HookId) -> bool {
        self.hooks.remove_hook(id)
    }

    /// Status of the current or most recent run
    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    /// Run the agent until a termination condition matches or it stops itself
    pub async fn run(&mut self, context: RunContext) -> RunReport {
        let mut state = AgentState::new();
        self.status = PipelineStatus::new();
        self.status.start();

        let agent_name = self.agent.name().to_string();
        let verbose = self.agent.config().enable_logging;
        info!(
            "Starting pipeline for {} agent: {} (run {})",
            self.agent.kind().as_str(),
            agent_name,
            self.status.run_id
        );

        let hooks = self.bind_hooks();
        hooks.fire(&HookEvent::PrePipeline {
            agent: &agent_name,
            state: &state,
            context: &context,
        });

        let context = self.prepare_context(context);

        if let Err(e) = self.agent.initialize(&context).await {
            return self.abort(state, &hooks, &agent_name, format!("Initialization failed: {}", e));
        }
        self.status.agent_status = AgentStatus::Running;
        debug!("Agent {} initialized", agent_name);

        let conditions = self.conditions();

        loop {
            self.status.current_iteration = state.iteration();

            if let Some(reason) = self.matched_condition(&conditions, &state) {
                let reason = StopReason::PreIterationCondition(reason);
                self.stop(&hooks, &agent_name, &state, reason);
                break;
            }

            hooks.fire(&HookEvent::PreIteration {
                agent: &agent_name,
                state: &state,
            });
            self.agent.pre_iteration_hook(&state);

            if verbose {
                info!("{}: starting iteration {}", agent_name, state.iteration() + 1);
            }

            let result = match self.agent.execute_iteration(&state).await {
                Ok(result) => result,
                Err(e) => match self.recover(&hooks, &agent_name, &state, e) {
                    Some(recovery) => recovery,
                    None => break,
                },
            };

            if let Some(error) = &result.error {
                error!("{}: iteration {} reported an error: {}", agent_name, state.iteration() + 1, error);
                self.status.errors.push(error.clone());
            }
            if verbose {
                info!("{}: iteration {} {}: {}", agent_name, state.iteration() + 1, result.status, result.message);
            }

            self.status.last_result_status = Some(result.status);
            state.update(result.data.clone());
            state.advance_iteration(result.message.clone());

            self.agent.post_iteration_hook(&state, &result);
            hooks.fire(&HookEvent::PostIteration {
                agent: &agent_name,
                state: &state,
                result: &result,
            });

            if result.terminal {
                self.status.agent_status = result.status;
                self.stop(&hooks, &agent_name, &state, StopReason::AgentRequested);
                break;
            }

            if let Some(reason) = self.matched_condition(&conditions, &state) {
                let reason = StopReason::PostIterationCondition(reason);
                self.stop(&hooks, &agent_name, &state, reason);
                break;
            }
        }

        self.status.total_iterations = state.iteration();

        let results = match self.agent.finalize(&state) {
            Ok(results) => results,
            Err(e) => {
                return self.abort(state, &hooks, &agent_name, format!("Finalization failed: {}", e));
            }
        };

        self.status.finish();
        info!(
            "Pipeline finished for agent {}: {} after {} iterations ({:.2}s)",
            agent_name,
            self.status.agent_status,
            self.status.total_iterations,
            self.status.duration_seconds()
        );

        hooks.fire(&HookEvent::PostPipeline {
            agent: &agent_name,
            state: &state,
            results: Some(&results),
        });

        RunReport {
            agent_results: Some(results),
            pipeline_status: RunSummary::from(&self.status),
            final_state: state,
            pipeline_error: None,
        }
    }

    /// Route an iteration error through the agent's `on_error`
    ///
    /// Returns the recovery result when the run may continue with it.
    fn recover(
        &mut self,
        hooks: &HookRegistry,
        agent_name: &str,
        state: &AgentState,
        error: AgentError,
    ) -> Option<AgentResult> {
        let message = error.to_string();
        error!("{}: iteration {} raised: {}", agent_name, state.iteration() + 1, message);

        let recovery = self.agent.on_error(&error, state);
        hooks.fire(&HookEvent::OnError {
            agent: agent_name,
            state,
            error: &message,
            recovery: Some(&recovery),
        });

        if recovery.terminal {
            self.status.errors.push(message);
            self.status.last_result_status = Some(recovery.status);
            self.status.agent_status = recovery.status;
            self.stop(hooks, agent_name, state, StopReason::AgentRequested);
            return None;
        }

        if recovery.status == AgentStatus::Failed {
            self.status.fail(message.clone());
            self.stop(hooks, agent_name, state, StopReason::Error(message));
            return None;
        }

        warn!("{}: recovered from error: {}", agent_name, recovery.message);
        self.status.warnings.push(format!("Recovered from error: {}", message));
        Some(recovery)
    }

    /// Return the description of the first condition that matches
    fn matched_condition(&mut self, conditions: &[TerminationCondition], state: &AgentState) -> Option<String> {
        for condition in conditions {
            match condition.evaluate(state, &self.status) {
                Ok(true) => {
                    debug!("Terminal condition met: {}", condition.description());
                    if condition.kind() == ConditionKind::ErrorStatus {
                        self.status.agent_status = AgentStatus::Failed;
                    }
                    return Some(condition.description());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Error evaluating condition '{}': {}", condition.description(), e);
                }
            }
        }
        None
    }

    fn stop(&self, hooks: &HookRegistry, agent_name: &str, state: &AgentState, reason: StopReason) {
        info!("{}: stopping, {}", agent_name, reason);
        hooks.fire(&HookEvent::OnTerminal {
            agent: agent_name,
            state,
            reason: &reason,
        });
    }

    fn abort(&mut self, state: AgentState, hooks: &HookRegistry, agent_name: &str, message: String) -> RunReport {
        error!("Pipeline failed for agent {}: {}", agent_name, message);
        self.status.total_iterations = state.iteration();
        self.status.fail(message.clone());
        self.status.finish();

        hooks.fire(&HookEvent::OnError {
            agent: agent_name,
            state: &state,
            error: &message,
            recovery: None,
        });

        RunReport {
            agent_results: None,
            pipeline_status: RunSummary::from(&self.status),
            final_state: state,
            pipeline_error: Some(message),
        }
    }

    /// Pipeline hooks plus the named hooks the configuration references
    fn bind_hooks(&mut self) -> HookRegistry {
        let mut hooks = self.hooks.clone();
        let config = self.agent.config();

        let mut unknown = Vec::new();
        unknown.extend(self.library.bind(&mut hooks, HookPoint::PrePipeline, &config.pre_hooks));
        unknown.extend(self.library.bind(&mut hooks, HookPoint::PostPipeline, &config.post_hooks));
        unknown.extend(self.library.bind(&mut hooks, HookPoint::OnError, &config.error_hooks));

        for name in unknown {
            warn!("Unknown hook '{}' referenced by agent {}", name, config.name);
            self.status.warnings.push(format!("Unknown hook: {}", name));
        }
        hooks
    }

    /// Apply the configuration's working directory and environment to the context
    fn prepare_context(&mut self, mut context: RunContext) -> RunContext {
        let config = self.agent.config();

        if let Some(dir) = &config.working_directory {
            if dir.is_dir() {
                debug!("Using working directory {}", dir.display());
                context.working_directory = Some(dir.clone());
            } else {
                let warning = format!("Working directory does not exist: {}", dir.display());
                warn!("{}", warning);
                self.status.warnings.push(warning);
            }
        }

        for (key, value) in &config.environment_variables {
            debug!("Setting environment variable {}", key);
            context.environment.insert(key.clone(), value.clone());
        }

        context
    }

    /// Configured conditions plus the implicit wall-clock budget
    fn conditions(&self) -> Vec<TerminationCondition> {
        let config = self.agent.config();
        let mut conditions = config.terminal_conditions.clone();
        if let Some(secs) = config.timeout_seconds {
            conditions.push(TerminationCondition::Timeout(secs as f64));
        }
        conditions
    }
}

//! Step domain model

use crate::agent::Agent;
use crate::core::condition::StatePredicate;
use crate::core::state::AgentState;
use std::fmt;

/// A single step in a composite workflow
///
/// The step exclusively owns its agent. Its identifier is the agent's name.
pub struct Step {
    /// Agent run to completion by a nested pipeline each time the step is selected
    pub agent: Box<dyn Agent>,

    /// Guard deciding whether the step may run (conditional mode)
    pub guard: Option<StatePredicate>,

    /// Step to prefer next after a successful run (conditional mode)
    pub on_success: Option<String>,

    /// Step to prefer next after a failed run (conditional mode)
    pub on_failure: Option<String>,

    /// Iteration bound override applied before each nested run
    pub max_iterations: Option<usize>,
}

impl Step {
    /// Create a step with no guard, routing or overrides
    pub fn new(agent: Box<dyn Agent>) -> Self {
        Self {
            agent,
            guard: None,
            on_success: None,
            on_failure: None,
            max_iterations: None,
        }
    }

    pub fn with_guard(mut self, guard: StatePredicate) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Guard on a closure over the composite's state
    pub fn when<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&AgentState) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.with_guard(StatePredicate::new(name, func))
    }

    pub fn on_success(mut self, step_id: impl Into<String>) -> Self {
        self.on_success = Some(step_id.into());
        self
    }

    pub fn on_failure(mut self, step_id: impl Into<String>) -> Self {
        self.on_failure = Some(step_id.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Step identifier (the agent's name)
    pub fn id(&self) -> &str {
        self.agent.name()
    }

    /// Evaluate the guard against the composite state
    ///
    /// A missing guard always passes. A guard that errors is treated as false.
    pub fn is_eligible(&self, state: &AgentState) -> bool {
        let Some(guard) = &self.guard else {
            return true;
        };

        match guard.evaluate(state) {
            Ok(passed) => passed,
            Err(e) => {
                tracing::warn!("Guard '{}' on step '{}' failed: {}", guard.name(), self.id(), e);
                false
            }
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id())
            .field("agent_type", &self.agent.agent_type())
            .field("guard", &self.guard)
            .field("on_success", &self.on_success)
            .field("on_failure", &self.on_failure)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

//! Pipeline hooks - callbacks fired at lifecycle points
//!
//! Hooks are best-effort: an error or panic inside a hook is logged and
//! swallowed, never altering the run.

use crate::agent::AgentResult;
use crate::core::{AgentState, RunContext};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Lifecycle points hooks can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    PrePipeline,
    PostPipeline,
    PreIteration,
    PostIteration,
    OnError,
    OnTerminal,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::PrePipeline => "pre_pipeline",
            HookPoint::PostPipeline => "post_pipeline",
            HookPoint::PreIteration => "pre_iteration",
            HookPoint::PostIteration => "post_iteration",
            HookPoint::OnError => "on_error",
            HookPoint::OnTerminal => "on_terminal",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// A termination condition matched before an iteration
    PreIterationCondition(String),
    /// A termination condition matched after an iteration
    PostIterationCondition(String),
    /// The agent returned a terminal result
    AgentRequested,
    /// An iteration error was not recovered
    Error(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::PreIterationCondition(c) => write!(f, "Pre-iteration terminal condition: {}", c),
            StopReason::PostIterationCondition(c) => write!(f, "Post-iteration terminal condition: {}", c),
            StopReason::AgentRequested => f.write_str("Agent requested termination"),
            StopReason::Error(e) => write!(f, "Unrecovered error: {}", e),
        }
    }
}

/// Payload handed to hooks
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    PrePipeline {
        agent: &'a str,
        state: &'a AgentState,
        context: &'a RunContext,
    },
    PostPipeline {
        agent: &'a str,
        state: &'a AgentState,
        results: Option<&'a Map<String, Value>>,
    },
    PreIteration {
        agent: &'a str,
        state: &'a AgentState,
    },
    PostIteration {
        agent: &'a str,
        state: &'a AgentState,
        result: &'a AgentResult,
    },
    OnError {
        agent: &'a str,
        state: &'a AgentState,
        error: &'a str,
        recovery: Option<&'a AgentResult>,
    },
    OnTerminal {
        agent: &'a str,
        state: &'a AgentState,
        reason: &'a StopReason,
    },
}

impl HookEvent<'_> {
    pub fn point(&self) -> HookPoint {
        match self {
            HookEvent::PrePipeline { .. } => HookPoint::PrePipeline,
            HookEvent::PostPipeline { .. } => HookPoint::PostPipeline,
            HookEvent::PreIteration { .. } => HookPoint::PreIteration,
            HookEvent::PostIteration { .. } => HookPoint::PostIteration,
            HookEvent::OnError { .. } => HookPoint::OnError,
            HookEvent::OnTerminal { .. } => HookPoint::OnTerminal,
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            HookEvent::PrePipeline { agent, .. }
            | HookEvent::PostPipeline { agent, .. }
            | HookEvent::PreIteration { agent, .. }
            | HookEvent::PostIteration { agent, .. }
            | HookEvent::OnError { agent, .. }
            | HookEvent::OnTerminal { agent, .. } => agent,
        }
    }

    pub fn state(&self) -> &AgentState {
        match self {
            HookEvent::PrePipeline { state, .. }
            | HookEvent::PostPipeline { state, .. }
            | HookEvent::PreIteration { state, .. }
            | HookEvent::PostIteration { state, .. }
            | HookEvent::OnError { state, .. }
            | HookEvent::OnTerminal { state, .. } => state,
        }
    }
}

/// Type for hook callbacks
pub type HookFn = Arc<dyn Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`HookRegistry::add_hook`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Hooks attached to one pipeline
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<(HookId, HookPoint, String, HookFn)>,
    next_id: u64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a callback to `point`
    pub fn add_hook<F>(&mut self, point: HookPoint, hook: F) -> HookId
    where
        F: Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(point, "anonymous".to_string(), Arc::new(hook))
    }

    /// Attach an already shared callback under a name used in log lines
    pub fn add_named(&mut self, point: HookPoint, name: impl Into<String>, hook: HookFn) -> HookId {
        self.insert(point, name.into(), hook)
    }

    /// Detach a callback; returns whether it was attached
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook_id, ..)| *hook_id != id);
        self.hooks.len() < before
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Fire every hook attached to the event's point, in insertion order
    ///
    /// Returns the number of hooks that failed.
    pub fn fire(&self, event: &HookEvent<'_>) -> usize {
        let point = event.point();
        let mut failures = 0;

        for (_, hook_point, name, hook) in &self.hooks {
            if *hook_point != point {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| hook(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("Hook '{}' failed at {}: {}", name, point, e);
                }
                Err(_) => {
                    failures += 1;
                    warn!("Hook '{}' panicked at {}", name, point);
                }
            }
        }

        failures
    }

    fn insert(&mut self, point: HookPoint, name: String, hook: HookFn) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;
        self.hooks.push((id, point, name, hook));
        id
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let points: Vec<(HookId, HookPoint, &str)> = self
            .hooks
            .iter()
            .map(|(id, point, name, _)| (*id, *point, name.as_str()))
            .collect();
        f.debug_struct("HookRegistry").field("hooks", &points).finish()
    }
}

/// Hooks referenced by name from configurations
#[derive(Clone, Default)]
pub struct HookLibrary {
    hooks: HashMap<String, HookFn>,
}

impl HookLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    pub fn get(&self, name: &str) -> Option<HookFn> {
        self.hooks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    /// Attach each named hook to `point`, returning the names that are unknown
    pub fn bind(&self, registry: &mut HookRegistry, point: HookPoint, names: &[String]) -> Vec<String> {
        let mut unknown = Vec::new();
        for name in names {
            match self.get(name) {
                Some(hook) => {
                    registry.add_named(point, name.clone(), hook);
                }
                None => unknown.push(name.clone()),
            }
        }
        unknown
    }
}

impl fmt::Debug for HookLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HookLibrary").field("hooks", &names).finish()
    }
}

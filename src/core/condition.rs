//! Termination condition model
//!
//! Conditions are evaluated by the pipeline before and after every iteration
//! with OR semantics. Predicate conditions hold compiled closures bound by
//! name at construction; only the name survives serialization.

use crate::core::{
    config::ConfigError,
    state::{AgentState, StateData},
    status::{AgentStatus, PipelineStatus},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Closure over the agent state
pub type StateFn = dyn Fn(&AgentState) -> anyhow::Result<bool> + Send + Sync;

/// Closure over the agent state and the run status
pub type RunFn = dyn Fn(&AgentState, &PipelineStatus) -> anyhow::Result<bool> + Send + Sync;

/// A named predicate over [`AgentState`], also used as a step guard
#[derive(Clone)]
pub struct StatePredicate {
    name: String,
    func: Arc<StateFn>,
}

impl StatePredicate {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&AgentState) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Predicate that is true when `key` holds exactly `expected`
    ///
    /// An absent key compares equal to `null`.
    pub fn equals(key: impl Into<String>, expected: impl Into<Value>) -> Self {
        let key = key.into();
        let expected = expected.into();
        let name = format!("{} == {}", key, expected);
        Self::new(name, move |state| {
            Ok(state.get(&key).unwrap_or(&Value::Null) == &expected)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, state: &AgentState) -> anyhow::Result<bool> {
        (self.func)(state)
    }
}

impl fmt::Debug for StatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatePredicate").field(&self.name).finish()
    }
}

/// A named predicate over the state and the pipeline status
#[derive(Clone)]
pub struct RunPredicate {
    name: String,
    func: Arc<RunFn>,
}

impl RunPredicate {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&AgentState, &PipelineStatus) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, state: &AgentState, status: &PipelineStatus) -> anyhow::Result<bool> {
        (self.func)(state, status)
    }
}

impl fmt::Debug for RunPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RunPredicate").field(&self.name).finish()
    }
}

/// Named predicates available to configurations and workflow definitions
#[derive(Debug, Clone, Default)]
pub struct PredicateRegistry {
    state: HashMap<String, StatePredicate>,
    custom: HashMap<String, RunPredicate>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state predicate under `name`
    pub fn register_state<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&AgentState) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let name = name.into();
        self.state.insert(name.clone(), StatePredicate::new(name, func));
        self
    }

    /// Register a custom (state + status) predicate under `name`
    pub fn register_custom<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&AgentState, &PipelineStatus) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let name = name.into();
        self.custom.insert(name.clone(), RunPredicate::new(name, func));
        self
    }

    pub fn state(&self, name: &str) -> Option<StatePredicate> {
        self.state.get(name).cloned()
    }

    pub fn custom(&self, name: &str) -> Option<RunPredicate> {
        self.custom.get(name).cloned()
    }
}

/// Tag of a termination condition in its serialized form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    MaxIterations,
    SuccessStatus,
    ErrorStatus,
    Timeout,
    StateCondition,
    CustomCondition,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::MaxIterations => "max_iterations",
            ConditionKind::SuccessStatus => "success_status",
            ConditionKind::ErrorStatus => "error_status",
            ConditionKind::Timeout => "timeout",
            ConditionKind::StateCondition => "state_condition",
            ConditionKind::CustomCondition => "custom_condition",
        }
    }
}

/// Rule that decides whether a run should stop
#[derive(Debug, Clone)]
pub enum TerminationCondition {
    /// Stop once the iteration counter reaches the bound
    MaxIterations(usize),
    /// Stop once an iteration reports `completed`
    SuccessStatus,
    /// Stop once an iteration reports `failed`
    ErrorStatus,
    /// Stop once the run has lasted this many seconds (checked between iterations)
    Timeout(f64),
    /// Stop when any listed key holds its listed value
    StateMatch(StateData),
    /// Stop when the predicate holds
    StatePredicate(StatePredicate),
    /// Stop when the predicate over state and status holds
    Custom(RunPredicate),
}

impl TerminationCondition {
    /// Key/value condition on a single key
    pub fn state_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut data = StateData::new();
        data.insert(key.into(), value.into());
        TerminationCondition::StateMatch(data)
    }

    pub fn state_predicate<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&AgentState) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        TerminationCondition::StatePredicate(StatePredicate::new(name, func))
    }

    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&AgentState, &PipelineStatus) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        TerminationCondition::Custom(RunPredicate::new(name, func))
    }

    pub fn kind(&self) -> ConditionKind {
        match self {
            TerminationCondition::MaxIterations(_) => ConditionKind::MaxIterations,
            TerminationCondition::SuccessStatus => ConditionKind::SuccessStatus,
            TerminationCondition::ErrorStatus => ConditionKind::ErrorStatus,
            TerminationCondition::Timeout(_) => ConditionKind::Timeout,
            TerminationCondition::StateMatch(_) | TerminationCondition::StatePredicate(_) => {
                ConditionKind::StateCondition
            }
            TerminationCondition::Custom(_) => ConditionKind::CustomCondition,
        }
    }

    /// Human-readable description used in logs and the serialized form
    pub fn description(&self) -> String {
        match self {
            TerminationCondition::MaxIterations(n) => format!("Stop after {} iterations", n),
            TerminationCondition::SuccessStatus => "Stop when an iteration completes".to_string(),
            TerminationCondition::ErrorStatus => "Stop when an iteration fails".to_string(),
            TerminationCondition::Timeout(secs) => format!("Stop after {} seconds", secs),
            TerminationCondition::StateMatch(data) => {
                let keys: Vec<&str> = data.keys().map(String::as_str).collect();
                format!("Stop when state matches on {}", keys.join(", "))
            }
            TerminationCondition::StatePredicate(p) => format!("Stop when '{}' holds", p.name()),
            TerminationCondition::Custom(p) => format!("Stop when '{}' holds", p.name()),
        }
    }

    /// Evaluate the condition
    ///
    /// Errors come only from predicate bodies; callers treat them as not met.
    pub fn evaluate(&self, state: &AgentState, status: &PipelineStatus) -> anyhow::Result<bool> {
        match self {
            TerminationCondition::MaxIterations(n) => Ok(state.iteration() >= *n),
            TerminationCondition::SuccessStatus => {
                Ok(status.last_result_status == Some(AgentStatus::Completed))
            }
            TerminationCondition::ErrorStatus => {
                Ok(status.last_result_status == Some(AgentStatus::Failed))
            }
            TerminationCondition::Timeout(secs) => {
                Ok(status.started_at.is_some() && status.duration_seconds() >= *secs)
            }
            TerminationCondition::StateMatch(expected) => Ok(expected
                .iter()
                .any(|(key, value)| state.get(key) == Some(value))),
            TerminationCondition::StatePredicate(p) => p.evaluate(state),
            TerminationCondition::Custom(p) => p.evaluate(state, status),
        }
    }

    /// Convert to the `{type, value, description}` record
    pub fn to_record(&self) -> ConditionRecord {
        let value = match self {
            TerminationCondition::MaxIterations(n) => json!(n),
            TerminationCondition::SuccessStatus | TerminationCondition::ErrorStatus => json!(true),
            TerminationCondition::Timeout(secs) => json!(secs),
            TerminationCondition::StateMatch(data) => Value::Object(data.clone()),
            TerminationCondition::StatePredicate(p) => json!(p.name()),
            TerminationCondition::Custom(p) => json!(p.name()),
        };

        ConditionRecord {
            kind: self.kind(),
            value,
            description: self.description(),
        }
    }

    /// Build a condition from its record, binding named predicates
    pub fn from_record(
        record: ConditionRecord,
        predicates: &PredicateRegistry,
    ) -> Result<Self, ConfigError> {
        let invalid = |record: &ConditionRecord| ConfigError::InvalidCondition {
            kind: record.kind.as_str().to_string(),
            value: record.value.to_string(),
        };

        match record.kind {
            ConditionKind::MaxIterations => record
                .value
                .as_u64()
                .map(|n| TerminationCondition::MaxIterations(n as usize))
                .ok_or_else(|| invalid(&record)),
            ConditionKind::SuccessStatus => Ok(TerminationCondition::SuccessStatus),
            ConditionKind::ErrorStatus => Ok(TerminationCondition::ErrorStatus),
            ConditionKind::Timeout => record
                .value
                .as_f64()
                .map(TerminationCondition::Timeout)
                .ok_or_else(|| invalid(&record)),
            ConditionKind::StateCondition => match &record.value {
                Value::Object(data) => Ok(TerminationCondition::StateMatch(data.clone())),
                Value::String(name) => predicates
                    .state(name)
                    .map(TerminationCondition::StatePredicate)
                    .ok_or_else(|| ConfigError::UnboundPredicate(name.clone())),
                _ => Err(invalid(&record)),
            },
            ConditionKind::CustomCondition => match &record.value {
                Value::String(name) => predicates
                    .custom(name)
                    .map(TerminationCondition::Custom)
                    .ok_or_else(|| ConfigError::UnboundPredicate(name.clone())),
                _ => Err(invalid(&record)),
            },
        }
    }
}

/// Serialized form of a [`TerminationCondition`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord {
    #[serde(rename = "type")]
    pub kind: ConditionKind,

    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub description: String,
}

impl Serialize for TerminationCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TerminationCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = ConditionRecord::deserialize(deserializer)?;
        TerminationCondition::from_record(record, &PredicateRegistry::default())
            .map_err(serde::de::Error::custom)
    }
}

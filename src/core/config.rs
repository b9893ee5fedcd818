//! Agent configuration
//!
//! An [`AgentConfig`] is owned by its agent and read by the pipeline. It can be
//! loaded from JSON or YAML; named predicates in termination conditions are
//! bound through a [`PredicateRegistry`] at load time.

use crate::core::condition::{ConditionKind, ConditionRecord, PredicateRegistry, TerminationCondition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default iteration bound
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Errors raised while loading or binding a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("invalid {kind} condition value: {value}")]
    InvalidCondition { kind: String, value: String },

    #[error("predicate '{0}' is not registered")]
    UnboundPredicate(String),
}

/// Free-form parameter map with typed accessors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set any value under `key`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get `key` converted to `T`; `None` if absent or of another shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get `key` converted to `T`, falling back to `default`
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into this map, overwriting existing keys
    pub fn merge(&mut self, other: &Parameters) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Resolve the whole map into a typed parameter struct
    pub fn resolve<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Configuration for an agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    /// Agent name, also the step identifier inside a composite
    pub name: String,

    /// Registry type identifier
    pub agent_type: String,

    pub description: String,

    /// Iteration bound backing the default max-iterations condition
    pub max_iterations: usize,

    /// Wall-clock budget, checked between iterations
    pub timeout_seconds: Option<u64>,

    pub enable_logging: bool,

    pub log_level: String,

    /// Conditions evaluated by the pipeline, any match stops the run
    pub terminal_conditions: Vec<TerminationCondition>,

    /// Agent-specific parameters
    pub parameters: Parameters,

    /// Working directory handed to the agent through the run context
    pub working_directory: Option<PathBuf>,

    /// Environment overrides handed to the agent through the run context
    pub environment_variables: BTreeMap<String, String>,

    /// Named hooks fired before the run
    pub pre_hooks: Vec<String>,

    /// Named hooks fired after the run
    pub post_hooks: Vec<String>,

    /// Named hooks fired on iteration errors
    pub error_hooks: Vec<String>,

    pub tags: Vec<String>,

    pub metadata: Map<String, Value>,
}

impl AgentConfig {
    /// Create a configuration with the default iteration bound
    pub fn new(name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.into(),
            description: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_seconds: None,
            enable_logging: true,
            log_level: "INFO".to_string(),
            terminal_conditions: vec![TerminationCondition::MaxIterations(DEFAULT_MAX_ITERATIONS)],
            parameters: Parameters::new(),
            working_directory: None,
            environment_variables: BTreeMap::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            error_hooks: Vec::new(),
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Configuration with a bound and a parameter map
    pub fn create_simple(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        max_iterations: usize,
        parameters: Parameters,
    ) -> Self {
        let mut config = Self::new(name, agent_type).with_max_iterations(max_iterations);
        config.parameters = parameters;
        config
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.set_max_iterations(max_iterations);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.set(key, value);
        self
    }

    pub fn with_condition(mut self, condition: TerminationCondition) -> Self {
        self.terminal_conditions.push(condition);
        self
    }

    /// Drop every condition, including the default iteration bound
    pub fn without_conditions(mut self) -> Self {
        self.terminal_conditions.clear();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    /// Change the iteration bound, rewriting every max-iterations condition
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
        for condition in &mut self.terminal_conditions {
            if let TerminationCondition::MaxIterations(bound) = condition {
                *bound = max_iterations;
            }
        }
    }

    pub fn get_parameter<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.parameters.get_or(key, default)
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.parameters.set(key, value);
    }

    pub fn add_terminal_condition(&mut self, condition: TerminationCondition) {
        self.terminal_conditions.push(condition);
    }

    /// Remove all conditions of `kind`; returns whether any were removed
    pub fn remove_terminal_conditions(&mut self, kind: ConditionKind) -> bool {
        let before = self.terminal_conditions.len();
        self.terminal_conditions.retain(|c| c.kind() != kind);
        self.terminal_conditions.len() < before
    }

    pub fn terminal_conditions_of(&self, kind: ConditionKind) -> Vec<&TerminationCondition> {
        self.terminal_conditions
            .iter()
            .filter(|c| c.kind() == kind)
            .collect()
    }

    /// Validate the configuration, returning every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Agent name is required".to_string());
        }
        if self.agent_type.trim().is_empty() {
            errors.push("Agent type is required".to_string());
        }
        if self.max_iterations == 0 {
            errors.push("max_iterations must be positive".to_string());
        }
        if self.timeout_seconds == Some(0) {
            errors.push("timeout_seconds must be positive".to_string());
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            errors.push(format!("log_level must be one of {}", LOG_LEVELS.join(", ")));
        }

        for (i, condition) in self.terminal_conditions.iter().enumerate() {
            if let TerminationCondition::Timeout(secs) = condition {
                if !secs.is_finite() || *secs <= 0.0 {
                    errors.push(format!("Terminal condition {}: timeout must be a positive number", i));
                }
            }
        }

        errors
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON without named predicates
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_json_with(json, &PredicateRegistry::default())
    }

    /// Parse JSON, binding named predicates from `predicates`
    pub fn from_json_with(json: &str, predicates: &PredicateRegistry) -> Result<Self, ConfigError> {
        let raw: RawAgentConfig = serde_json::from_str(json)?;
        raw.into_config(predicates)
    }

    /// Parse YAML, binding named predicates from `predicates`
    pub fn from_yaml_with(yaml: &str, predicates: &PredicateRegistry) -> Result<Self, ConfigError> {
        let raw: RawAgentConfig = serde_yaml::from_str(yaml)?;
        raw.into_config(predicates)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P, predicates: &PredicateRegistry) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_with(&content, predicates),
            _ => Self::from_yaml_with(&content, predicates),
        }
    }
}

impl<'de> Deserialize<'de> for AgentConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawAgentConfig::deserialize(deserializer)?
            .into_config(&PredicateRegistry::default())
            .map_err(serde::de::Error::custom)
    }
}

/// Wire shape of [`AgentConfig`] before predicates are bound
#[derive(Debug, Deserialize)]
struct RawAgentConfig {
    name: String,
    agent_type: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_max_iterations")]
    max_iterations: usize,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default = "default_true")]
    enable_logging: bool,
    #[serde(default = "default_log_level")]
    log_level: String,
    /// `None` when absent, which installs the default bound
    #[serde(default)]
    terminal_conditions: Option<Vec<ConditionRecord>>,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    working_directory: Option<PathBuf>,
    #[serde(default)]
    environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pre_hooks: Vec<String>,
    #[serde(default)]
    post_hooks: Vec<String>,
    #[serde(default)]
    error_hooks: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl RawAgentConfig {
    fn into_config(self, predicates: &PredicateRegistry) -> Result<AgentConfig, ConfigError> {
        let terminal_conditions = match self.terminal_conditions {
            None => vec![TerminationCondition::MaxIterations(self.max_iterations)],
            Some(records) => records
                .into_iter()
                .map(|record| TerminationCondition::from_record(record, predicates))
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(AgentConfig {
            name: self.name,
            agent_type: self.agent_type,
            description: self.description,
            max_iterations: self.max_iterations,
            timeout_seconds: self.timeout_seconds,
            enable_logging: self.enable_logging,
            log_level: self.log_level,
            terminal_conditions,
            parameters: self.parameters,
            working_directory: self.working_directory,
            environment_variables: self.environment_variables,
            pre_hooks: self.pre_hooks,
            post_hooks: self.post_hooks,
            error_hooks: self.error_hooks,
            tags: self.tags,
            metadata: self.metadata,
        })
    }
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

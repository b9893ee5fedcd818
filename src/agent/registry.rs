//! Agent registry - maps type identifiers to factories
//!
//! Registration is explicit: callers populate the registry at start-up
//! (see [`AgentRegistry::with_builtins`]) and builders create agents from it.
//! Pipelines and composites never consult the registry.

use crate::agent::command::{CommandAgent, COMMAND_AGENT_TYPE};
use crate::agent::Agent;
use crate::core::AgentConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Factory building an agent from its configuration
pub type AgentFactory = Arc<dyn Fn(AgentConfig) -> anyhow::Result<Box<dyn Agent>> + Send + Sync>;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Agent type '{0}' not found")]
    NotFound(String),

    #[error("Agent type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Factory for '{expected}' returned an agent of type '{actual}'")]
    WrongType { expected: String, actual: String },

    #[error("Failed to create agent '{agent_type}': {source}")]
    ConstructionFailed {
        agent_type: String,
        #[source]
        source: anyhow::Error,
    },
}

/// JSON type expected for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "a string",
            ParamType::Integer => "an integer",
            ParamType::Number => "a number",
            ParamType::Boolean => "a boolean",
            ParamType::Array => "an array",
            ParamType::Object => "an object",
        }
    }
}

/// Schema entry for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,

    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(kind: ParamType) -> Self {
        Self { kind, required: true }
    }

    pub fn optional(kind: ParamType) -> Self {
        Self { kind, required: false }
    }
}

/// Metadata about a registered agent type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_type: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub tags: Vec<String>,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl AgentMetadata {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            author: String::new(),
            tags: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(key.into(), spec);
        self
    }
}

struct RegistryEntry {
    metadata: AgentMetadata,
    factory: AgentFactory,
}

/// Static `type -> factory` registration map
#[derive(Default)]
pub struct AgentRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in agent types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let metadata = AgentMetadata::new(COMMAND_AGENT_TYPE)
            .with_description("Runs an external command once per iteration")
            .with_tag("builtin")
            .with_tag("process")
            .with_parameter("command", ParameterSpec::required(ParamType::String))
            .with_parameter("args", ParameterSpec::optional(ParamType::Array))
            .with_parameter("success_pattern", ParameterSpec::optional(ParamType::String))
            .with_parameter("use_regex", ParameterSpec::optional(ParamType::Boolean))
            .with_parameter("timeout_secs", ParameterSpec::optional(ParamType::Integer))
            .with_parameter("fail_on_nonzero", ParameterSpec::optional(ParamType::Boolean));

        // An empty registry cannot already hold the built-in type
        let _ = registry.register(metadata, |config| {
            Ok(Box::new(CommandAgent::new(config)?) as Box<dyn Agent>)
        });
        registry
    }

    /// Register an agent type
    pub fn register<F>(&mut self, metadata: AgentMetadata, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(AgentConfig) -> anyhow::Result<Box<dyn Agent>> + Send + Sync + 'static,
    {
        if self.entries.contains_key(&metadata.agent_type) {
            return Err(RegistryError::AlreadyRegistered(metadata.agent_type));
        }

        tracing::debug!("Registered agent type '{}'", metadata.agent_type);
        self.entries.insert(
            metadata.agent_type.clone(),
            RegistryEntry {
                metadata,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    /// Remove an agent type, returning whether it was registered
    pub fn unregister(&mut self, agent_type: &str) -> bool {
        self.entries.remove(agent_type).is_some()
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.entries.contains_key(agent_type)
    }

    /// Registered type identifiers, sorted
    pub fn agent_types(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn metadata(&self, agent_type: &str) -> Result<&AgentMetadata, RegistryError> {
        self.entries
            .get(agent_type)
            .map(|entry| &entry.metadata)
            .ok_or_else(|| RegistryError::NotFound(agent_type.to_string()))
    }

    /// Metadata of every registered type, optionally filtered by tag
    pub fn list(&self, tag: Option<&str>) -> Vec<&AgentMetadata> {
        self.entries
            .values()
            .map(|entry| &entry.metadata)
            .filter(|metadata| tag.map_or(true, |t| metadata.tags.iter().any(|x| x == t)))
            .collect()
    }

    /// Create an agent of `agent_type`
    ///
    /// An empty `config.agent_type` is filled in. The created agent must
    /// report the requested type.
    pub fn create(&self, agent_type: &str, mut config: AgentConfig) -> Result<Box<dyn Agent>, RegistryError> {
        let entry = self
            .entries
            .get(agent_type)
            .ok_or_else(|| RegistryError::NotFound(agent_type.to_string()))?;

        if config.agent_type.is_empty() {
            config.agent_type = agent_type.to_string();
        }

        let agent = (entry.factory)(config).map_err(|source| RegistryError::ConstructionFailed {
            agent_type: agent_type.to_string(),
            source,
        })?;

        if agent.agent_type() != agent_type {
            return Err(RegistryError::WrongType {
                expected: agent_type.to_string(),
                actual: agent.agent_type().to_string(),
            });
        }

        Ok(agent)
    }

    /// Create an agent of the type named in its configuration
    pub fn create_from_config(&self, config: AgentConfig) -> Result<Box<dyn Agent>, RegistryError> {
        let agent_type = config.agent_type.clone();
        self.create(&agent_type, config)
    }

    /// Validate `config` against the generic rules and the type's parameter schema
    pub fn validate_config(&self, agent_type: &str, config: &AgentConfig) -> Vec<String> {
        let mut errors = config.validate();

        let Some(entry) = self.entries.get(agent_type) else {
            errors.push(format!("Unknown agent type: {}", agent_type));
            return errors;
        };

        for (key, spec) in &entry.metadata.parameters {
            match config.parameters.raw(key) {
                None if spec.required => {
                    errors.push(format!("Required parameter '{}' is missing", key));
                }
                Some(value) if !spec.kind.accepts(value) => {
                    errors.push(format!("Parameter '{}' must be {}", key, spec.kind.as_str()));
                }
                _ => {}
            }
        }

        errors
    }

    /// Summary of the registry contents
    pub fn info(&self) -> Value {
        json!({
            "total_agents": self.entries.len(),
            "agent_types": self.agent_types(),
            "agents": self.list(None),
        })
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agent_types", &self.agent_types())
            .finish()
    }
}

//! Workflow definition - the serialized form of a composite agent

use crate::agent::{Agent, AgentRegistry};
use crate::core::{
    AgentConfig, ConditionRecord, Parameters, PredicateRegistry, StatePredicate, Step,
    TerminationCondition, DEFAULT_MAX_ITERATIONS,
};
use crate::execution::{CompositeAgent, WorkflowMode, COMPOSITE_AGENT_TYPE};
use crate::workflow::WorkflowError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Guard of a step, bound to a compiled predicate at build time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuardSpec {
    /// Name of a predicate in the [`PredicateRegistry`]
    Named(String),
    /// True when `key` holds exactly `equals`
    Equals { key: String, equals: Value },
}

impl GuardSpec {
    pub fn named(name: impl Into<String>) -> Self {
        GuardSpec::Named(name.into())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        GuardSpec::Equals {
            key: key.into(),
            equals: value.into(),
        }
    }

    /// Bind the guard to a predicate
    pub fn resolve(&self, predicates: &PredicateRegistry) -> Result<StatePredicate, WorkflowError> {
        match self {
            GuardSpec::Named(name) => predicates
                .state(name)
                .ok_or_else(|| WorkflowError::UnboundGuard(name.clone())),
            GuardSpec::Equals { key, equals } => Ok(StatePredicate::equals(key.clone(), equals.clone())),
        }
    }
}

/// One step of a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Registry type of the step's agent, or `composite` for a nested workflow
    pub agent_type: String,

    /// Step name, also the agent name
    pub name: String,

    /// Agent parameters, layered over the workflow's `global_config`
    #[serde(default)]
    pub config: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<GuardSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Replaces the default iteration bound when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_conditions: Option<Vec<ConditionRecord>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_hooks: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_hooks: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_hooks: Vec<String>,

    /// Nested workflow for `composite` steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Box<WorkflowDefinition>>,
}

impl StepDefinition {
    pub fn new(agent_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            name: name.into(),
            config: Map::new(),
            condition: None,
            on_success: None,
            on_failure: None,
            max_iterations: None,
            timeout_seconds: None,
            terminal_conditions: None,
            working_directory: None,
            environment_variables: BTreeMap::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            error_hooks: Vec::new(),
            workflow: None,
        }
    }

    /// Step running a nested workflow
    pub fn nested(workflow: WorkflowDefinition) -> Self {
        let mut step = Self::new(COMPOSITE_AGENT_TYPE, workflow.name.clone());
        step.workflow = Some(Box::new(workflow));
        step
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn when(mut self, guard: GuardSpec) -> Self {
        self.condition = Some(guard);
        self
    }

    pub fn on_success(mut self, step: impl Into<String>) -> Self {
        self.on_success = Some(step.into());
        self
    }

    pub fn on_failure(mut self, step: impl Into<String>) -> Self {
        self.on_failure = Some(step.into());
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    fn is_nested(&self) -> bool {
        self.agent_type == COMPOSITE_AGENT_TYPE
    }

    /// Agent configuration of this step
    fn agent_config(
        &self,
        global: &Map<String, Value>,
        predicates: &PredicateRegistry,
    ) -> Result<AgentConfig, WorkflowError> {
        let mut parameters = Parameters::from(global.clone());
        parameters.merge(&Parameters::from(self.config.clone()));

        let mut config = AgentConfig::create_simple(
            self.name.clone(),
            self.agent_type.clone(),
            self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            parameters,
        );
        config.timeout_seconds = self.timeout_seconds;
        config.working_directory = self.working_directory.clone();
        config.environment_variables = self.environment_variables.clone();
        config.pre_hooks = self.pre_hooks.clone();
        config.post_hooks = self.post_hooks.clone();
        config.error_hooks = self.error_hooks.clone();

        if let Some(records) = &self.terminal_conditions {
            config.terminal_conditions = records
                .iter()
                .cloned()
                .map(|record| TerminationCondition::from_record(record, predicates))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| WorkflowError::Config {
                    step: self.name.clone(),
                    source,
                })?;
        }

        Ok(config)
    }

    fn build(
        &self,
        global: &Map<String, Value>,
        registry: &AgentRegistry,
        predicates: &PredicateRegistry,
    ) -> Result<Step, WorkflowError> {
        let agent: Box<dyn Agent> = match &self.workflow {
            Some(nested) if self.is_nested() => {
                let mut composite = nested.build(registry, predicates)?;
                let config = composite.config_mut();
                config.name = self.name.clone();
                if let Some(max_iterations) = self.max_iterations {
                    config.set_max_iterations(max_iterations);
                }
                Box::new(composite)
            }
            _ => registry.create(&self.agent_type, self.agent_config(global, predicates)?)?,
        };

        let mut step = Step::new(agent);
        if let Some(guard) = &self.condition {
            step = step.with_guard(guard.resolve(predicates)?);
        }
        step.on_success = self.on_success.clone();
        step.on_failure = self.on_failure.clone();
        step.max_iterations = self.max_iterations;
        Ok(step)
    }
}

/// A composite agent described as data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub mode: WorkflowMode,

    /// Parameters shared by every step
    #[serde(default)]
    pub global_config: Map<String, Value>,

    /// Iteration bound of the composite itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

fn default_name() -> String {
    "workflow".to_string()
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: WorkflowMode::default(),
            global_config: Map::new(),
            max_iterations: None,
            timeout_seconds: None,
            steps: Vec::new(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, WorkflowError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn to_yaml(&self) -> Result<String, WorkflowError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String, WorkflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the definition's shape: names, routes and overrides
    pub fn validate_structure(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Workflow name is required".to_string());
        }
        if self.max_iterations == Some(0) {
            errors.push(format!("Workflow '{}': max_iterations must be positive", self.name));
        }

        // Check that all step names are unique
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                errors.push(format!("Workflow '{}': step name is required", self.name));
            }
            if !seen.insert(step.name.as_str()) {
                errors.push(format!("Duplicate step name: {}", step.name));
            }
        }

        // Check that routes reference existing steps
        for step in &self.steps {
            if let Some(target) = &step.on_success {
                if !seen.contains(target.as_str()) {
                    errors.push(format!(
                        "Step '{}' on_success references non-existent step '{}'",
                        step.name, target
                    ));
                }
            }
            if let Some(target) = &step.on_failure {
                if !seen.contains(target.as_str()) {
                    errors.push(format!(
                        "Step '{}' on_failure references non-existent step '{}'",
                        step.name, target
                    ));
                }
            }
            if step.max_iterations == Some(0) {
                errors.push(format!("Step '{}': max_iterations must be positive", step.name));
            }

            match (&step.workflow, step.is_nested()) {
                (Some(nested), true) => {
                    errors.extend(
                        nested
                            .validate_structure()
                            .into_iter()
                            .map(|e| format!("{} > {}", step.name, e)),
                    );
                }
                (None, true) => {
                    errors.push(format!("Step '{}' is a composite without a workflow", step.name));
                }
                (Some(_), false) => {
                    errors.push(format!(
                        "Step '{}' has a nested workflow but agent type '{}'",
                        step.name, step.agent_type
                    ));
                }
                (None, false) => {}
            }
        }

        errors
    }

    /// Full validation: structure, agent types, parameter schemas and predicate names
    pub fn validate(&self, registry: &AgentRegistry, predicates: &PredicateRegistry) -> Vec<String> {
        let mut errors = self.validate_structure();

        for step in &self.steps {
            if let Some(GuardSpec::Named(name)) = &step.condition {
                if predicates.state(name).is_none() {
                    errors.push(format!("Step '{}' guard '{}' is not registered", step.name, name));
                }
            }

            if step.is_nested() {
                if let Some(nested) = &step.workflow {
                    errors.extend(
                        nested
                            .validate_types(registry, predicates)
                            .into_iter()
                            .map(|e| format!("{} > {}", step.name, e)),
                    );
                }
                continue;
            }

            match step.agent_config(&self.global_config, predicates) {
                Ok(config) => {
                    for error in registry.validate_config(&step.agent_type, &config) {
                        errors.push(format!("Step '{}': {}", step.name, error));
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        errors
    }

    /// [`validate`](Self::validate) without repeating the structural checks
    fn validate_types(&self, registry: &AgentRegistry, predicates: &PredicateRegistry) -> Vec<String> {
        let structural: HashSet<String> = self.validate_structure().into_iter().collect();
        self.validate(registry, predicates)
            .into_iter()
            .filter(|e| !structural.contains(e))
            .collect()
    }

    /// Build the composite agent
    pub fn build(
        &self,
        registry: &AgentRegistry,
        predicates: &PredicateRegistry,
    ) -> Result<CompositeAgent, WorkflowError> {
        let errors = self.validate(registry, predicates);
        if !errors.is_empty() {
            return Err(WorkflowError::Invalid(errors));
        }

        let mut config = AgentConfig::new(self.name.clone(), COMPOSITE_AGENT_TYPE)
            .with_max_iterations(self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS));
        config.timeout_seconds = self.timeout_seconds;
        config.parameters = Parameters::from(self.global_config.clone());

        let mut composite = CompositeAgent::new(config).with_mode(self.mode);
        for step in &self.steps {
            debug!("Building step '{}' ({})", step.name, step.agent_type);
            composite.add_step(step.build(&self.global_config, registry, predicates)?);
        }

        Ok(composite)
    }
}

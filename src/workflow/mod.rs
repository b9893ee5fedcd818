//! Declarative workflows
//!
//! A [`WorkflowDefinition`] describes a composite agent as data (YAML or
//! JSON); [`WorkflowBuilder`] assembles one fluently. Both build a
//! [`CompositeAgent`](crate::execution::CompositeAgent) through an
//! [`AgentRegistry`](crate::agent::AgentRegistry).

pub mod builder;
pub mod definition;

pub use builder::WorkflowBuilder;
pub use definition::{GuardSpec, StepDefinition, WorkflowDefinition};

use crate::agent::RegistryError;
use crate::core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or building a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Failed to read workflow file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML workflow: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON workflow: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid workflow: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Step '{step}': {source}")]
    Config {
        step: String,
        #[source]
        source: ConfigError,
    },

    #[error("Guard predicate '{0}' is not registered")]
    UnboundGuard(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

//! Iteration result and agent error types

use crate::core::status::AgentStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error types for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Process error: {0}")]
    Process(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of one iteration
///
/// Consumed immediately by the pipeline: `data` is merged into the run state
/// and `message` labels the snapshot taken for the iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Status of the iteration
    pub status: AgentStatus,

    /// Message describing the iteration
    pub message: String,

    /// Keys merged into the run state
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Whether the run should stop after this iteration
    #[serde(default)]
    pub terminal: bool,

    /// Error description, if the iteration failed
    #[serde(default)]
    pub error: Option<String>,
}

impl AgentResult {
    /// Non-terminal result, the run keeps going
    pub fn running(message: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Running,
            message: message.into(),
            data: Map::new(),
            terminal: false,
            error: None,
        }
    }

    /// Terminal successful result
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Completed,
            terminal: true,
            ..Self::running(message)
        }
    }

    /// Terminal failed result carrying `error`
    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Failed,
            terminal: true,
            error: Some(error.into()),
            ..Self::running(message)
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_map(mut self, data: Map<String, Value>) -> Self {
        self.data.extend(data);
        self
    }

    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status != AgentStatus::Failed && self.error.is_none()
    }
}

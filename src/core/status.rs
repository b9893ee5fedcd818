//! Run status models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an agent's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent is being set up
    Initializing,
    /// Agent is iterating
    Running,
    /// Agent finished successfully
    Completed,
    /// Agent failed
    Failed,
}

impl AgentStatus {
    /// Lowercase name used in serialized forms and log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        }
    }

    /// Check if this status ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status tracking for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// Unique run ID
    pub run_id: Uuid,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Iteration currently being executed
    pub current_iteration: usize,

    /// Iterations handled by the end of the run
    pub total_iterations: usize,

    /// Lifecycle status of the driven agent
    pub agent_status: AgentStatus,

    /// Status reported by the most recent iteration result
    #[serde(default)]
    pub last_result_status: Option<AgentStatus>,

    /// Errors collected during the run
    pub errors: Vec<String>,

    /// Non-fatal problems (unknown hooks, bad working directory, ...)
    pub warnings: Vec<String>,
}

impl PipelineStatus {
    /// Create a fresh status
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: None,
            completed_at: None,
            current_iteration: 0,
            total_iterations: 0,
            agent_status: AgentStatus::Initializing,
            last_result_status: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Mark the run as started
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.agent_status = AgentStatus::Initializing;
    }

    /// Mark the run as finished, keeping a recorded failure
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
        if self.agent_status != AgentStatus::Failed {
            self.agent_status = AgentStatus::Completed;
        }
    }

    /// Mark the run as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.agent_status = AgentStatus::Failed;
        self.errors.push(error.into());
    }

    /// Elapsed wall-clock time, measured to now while still running
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some(end - started)
    }

    /// Elapsed seconds as a float (0.0 before start)
    pub fn duration_seconds(&self) -> f64 {
        self.duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    /// Check if the run is currently iterating
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
            && self.completed_at.is_none()
            && self.agent_status == AgentStatus::Running
    }
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}

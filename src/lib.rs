//! agentic-pipeline - An orchestration engine for iterative, stateful agents

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod workflow;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentKind, AgentRegistry, AgentResult};
pub use core::{AgentConfig, AgentState, AgentStatus, RunContext, Step, TerminationCondition};
pub use execution::{CompositeAgent, HookEvent, HookPoint, Pipeline, RunReport, WorkflowMode};
pub use workflow::{WorkflowBuilder, WorkflowDefinition};

//! Execution - the pipeline run loop, hooks and composite workflows

pub mod composite;
pub mod hooks;
pub mod pipeline;

pub use composite::{CompositeAgent, WorkflowMode, COMPOSITE_AGENT_TYPE};
pub use hooks::{HookEvent, HookFn, HookId, HookLibrary, HookPoint, HookRegistry, StopReason};
pub use pipeline::{Pipeline, RunReport, RunSummary};

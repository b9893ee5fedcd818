//! Core domain models
//!
//! Configuration, termination conditions, agent state and run status. These
//! are the leaves every other module builds on.

pub mod condition;
pub mod config;
pub mod context;
pub mod state;
pub mod status;
pub mod step;

pub use condition::*;
pub use config::*;
pub use context::*;
pub use state::*;
pub use status::*;
pub use step::*;

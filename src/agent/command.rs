//! Built-in agent that runs an external command once per iteration

use crate::agent::{base_results, Agent, AgentError, AgentResult};
use crate::core::{AgentConfig, AgentState, ConfigError, RunContext};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Registry type identifier
pub const COMMAND_AGENT_TYPE: &str = "command";

/// Typed parameters of a [`CommandAgent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParams {
    /// Program to run
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Output pattern that marks the work as done
    #[serde(default)]
    pub success_pattern: Option<String>,

    /// Treat `success_pattern` as a regular expression
    #[serde(default)]
    pub use_regex: bool,

    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Treat a non-zero exit status as an iteration error
    #[serde(default = "default_true")]
    pub fail_on_nonzero: bool,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Pattern for matching command output
#[derive(Debug, Clone)]
pub enum OutputPattern {
    /// Simple string contains match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl OutputPattern {
    /// Build a pattern, falling back to a plain match when the regex is invalid
    pub fn new(pattern: &str, use_regex: bool) -> Self {
        if !use_regex {
            return OutputPattern::Simple(pattern.to_string());
        }
        match Regex::new(pattern) {
            Ok(regex) => OutputPattern::Regex(regex),
            Err(e) => {
                warn!("Invalid success pattern '{}', matching literally: {}", pattern, e);
                OutputPattern::Simple(pattern.to_string())
            }
        }
    }

    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            OutputPattern::Simple(pattern) => text.contains(pattern.as_str()),
            OutputPattern::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Agent that runs `command args...` once per iteration
///
/// Without a success pattern a zero exit status completes the run. With one,
/// the run completes once the output matches and keeps iterating otherwise.
#[derive(Debug)]
pub struct CommandAgent {
    config: AgentConfig,
    params: CommandParams,
    pattern: Option<OutputPattern>,
    working_directory: Option<PathBuf>,
    environment: BTreeMap<String, String>,
    last_output: Option<String>,
    exit_code: Option<i32>,
}

impl CommandAgent {
    /// Create the agent, resolving its parameters from the configuration
    pub fn new(config: AgentConfig) -> Result<Self, ConfigError> {
        let params: CommandParams = config.parameters.resolve()?;
        if params.command.trim().is_empty() {
            return Err(ConfigError::Invalid(vec![format!(
                "Agent '{}': command must not be empty",
                config.name
            )]));
        }

        let pattern = params
            .success_pattern
            .as_deref()
            .map(|p| OutputPattern::new(p, params.use_regex));

        Ok(Self {
            config,
            params,
            pattern,
            working_directory: None,
            environment: BTreeMap::new(),
            last_output: None,
            exit_code: None,
        })
    }

    pub fn params(&self) -> &CommandParams {
        &self.params
    }

    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    async fn run_command(&self, iteration: usize) -> Result<(i32, String), AgentError> {
        debug!(
            "Running '{}' with {} args for agent '{}'",
            self.params.command,
            self.params.args.len(),
            self.config.name
        );

        let mut command = Command::new(&self.params.command);
        command
            .args(&self.params.args)
            .envs(&self.environment)
            .env("AGENT_ITERATION", iteration.to_string())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        let output = timeout(Duration::from_secs(self.params.timeout_secs), command.output())
            .await
            .map_err(|_| AgentError::Timeout(self.params.timeout_secs))??;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() && self.params.fail_on_nonzero {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} exited with code {}: {}", self.params.command, exit_code, stderr.trim());
            return Err(AgentError::Execution(format!(
                "{} exited with code {}: {}",
                self.params.command,
                exit_code,
                stderr.trim()
            )));
        }

        Ok((exit_code, stdout))
    }
}

#[async_trait]
impl Agent for CommandAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut AgentConfig {
        &mut self.config
    }

    async fn initialize(&mut self, context: &RunContext) -> Result<(), AgentError> {
        self.working_directory = context.working_directory.clone();
        self.environment = context.environment.clone();
        self.last_output = None;
        self.exit_code = None;
        Ok(())
    }

    async fn execute_iteration(&mut self, state: &AgentState) -> Result<AgentResult, AgentError> {
        let iteration = state.iteration() + 1;
        let (exit_code, output) = self.run_command(iteration).await?;

        let done = match &self.pattern {
            Some(pattern) => pattern.matches(&output),
            None => exit_code == 0,
        };

        self.exit_code = Some(exit_code);
        self.last_output = Some(output.clone());

        let message = if done {
            format!("{} succeeded", self.params.command)
        } else {
            format!("{} ran (exit code {})", self.params.command, exit_code)
        };

        let result = if done {
            AgentResult::completed(message)
        } else {
            AgentResult::running(message)
        };

        Ok(result
            .with_data("last_output", output)
            .with_data("exit_code", exit_code))
    }

    fn check_terminal_condition(&self, _state: &AgentState) -> bool {
        match (&self.pattern, &self.last_output) {
            (Some(pattern), Some(output)) => pattern.matches(output),
            (None, Some(_)) => self.exit_code == Some(0),
            (_, None) => false,
        }
    }

    fn finalize(&mut self, state: &AgentState) -> Result<Map<String, Value>, AgentError> {
        let mut results = base_results(self, state);
        results.insert("command".to_string(), json!(self.params.command));
        results.insert("exit_code".to_string(), json!(self.exit_code));
        results.insert("last_output".to_string(), json!(self.last_output));
        Ok(results)
    }
}

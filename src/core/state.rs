//! Agent state with snapshot history
//!
//! `AgentState` is the mutable key/value store a pipeline run threads through
//! every iteration. Each call to [`AgentState::advance_iteration`] appends an
//! immutable [`StateSnapshot`], so the counter always equals the history
//! length and any earlier iteration can be restored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Key/value mapping held by the state and copied into snapshots
pub type StateData = Map<String, Value>;

/// A copy of the state mapping taken at a given iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Iteration counter at the time of the snapshot
    pub iteration: usize,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Full copy of the mapping
    pub data: StateData,

    /// Free-form note, usually the iteration result message
    pub message: String,
}

/// Creation and modification timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StateMetadata {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

/// Evolving state of one agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    data: StateData,
    metadata: StateMetadata,
    iteration: usize,
    history: Vec<StateSnapshot>,
}

impl AgentState {
    /// Create an empty state at iteration 0
    pub fn new() -> Self {
        Self::with_data(StateData::new())
    }

    /// Create a state seeded with initial data
    pub fn with_data(data: StateData) -> Self {
        Self {
            data,
            metadata: StateMetadata::now(),
            iteration: 0,
            history: Vec::new(),
        }
    }

    /// Current mapping
    pub fn data(&self) -> &StateData {
        &self.data
    }

    pub fn metadata(&self) -> &StateMetadata {
        &self.metadata
    }

    /// Current iteration counter
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Snapshots in the order they were taken
    pub fn history(&self) -> &[StateSnapshot] {
        &self.history
    }

    pub fn latest_snapshot(&self) -> Option<&StateSnapshot> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Get a value from the mapping
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a value in the mapping
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
        self.touch();
    }

    /// Merge a mapping into the state, overwriting existing keys
    pub fn update(&mut self, data: StateData) {
        self.data.extend(data);
        self.touch();
    }

    /// Remove and return a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let value = self.data.remove(key);
        if value.is_some() {
            self.touch();
        }
        value
    }

    /// Append a snapshot of the current mapping without moving the counter
    pub fn snapshot(&mut self, message: impl Into<String>) -> &StateSnapshot {
        self.history.push(StateSnapshot {
            iteration: self.iteration,
            timestamp: Utc::now(),
            data: self.data.clone(),
            message: message.into(),
        });
        &self.history[self.history.len() - 1]
    }

    /// Snapshot the current mapping, then move to the next iteration
    pub fn advance_iteration(&mut self, message: impl Into<String>) {
        self.snapshot(message);
        self.iteration += 1;
    }

    /// Restore the mapping recorded in snapshot `iteration`
    ///
    /// History is truncated to `iteration + 1` entries and the counter is left
    /// where `advance_iteration` put it after that snapshot, so the counter
    /// still equals the history length. Returns `false` and leaves the state
    /// untouched when no such snapshot exists.
    pub fn rollback_to_iteration(&mut self, iteration: usize) -> bool {
        let Some(snapshot) = self.history.get(iteration) else {
            return false;
        };

        self.data = snapshot.data.clone();
        self.iteration = iteration + 1;
        self.history.truncate(iteration + 1);
        self.touch();
        true
    }

    /// Key-level difference between two snapshots
    ///
    /// Keys are prefixed with `+` (added), `-` (removed) or `~` (changed, with
    /// a `{from, to}` payload). Out-of-range indices produce an empty diff.
    pub fn get_diff(&self, from_iteration: usize, to_iteration: usize) -> Map<String, Value> {
        let mut diff = Map::new();
        let (Some(from), Some(to)) = (
            self.history.get(from_iteration),
            self.history.get(to_iteration),
        ) else {
            return diff;
        };

        for (key, value) in &to.data {
            match from.data.get(key) {
                None => {
                    diff.insert(format!("+{}", key), value.clone());
                }
                Some(previous) if previous != value => {
                    diff.insert(
                        format!("~{}", key),
                        json!({ "from": previous, "to": value }),
                    );
                }
                Some(_) => {}
            }
        }

        for (key, value) in &from.data {
            if !to.data.contains_key(key) {
                diff.insert(format!("-{}", key), value.clone());
            }
        }

        diff
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Restore from JSON produced by [`AgentState::to_json`]
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of model calls; 0 disables the bound.
    pub step_limit: u64,
    /// Maximum accumulated model cost in dollars; 0 disables the bound.
    pub cost_limit: f64,
    /// Consecutive rejected attempts under one node before the branch is
    /// declared a dead end.
    pub max_invalid: usize,
    /// Default window for nearby-code-context extraction.
    pub window_size: usize,
    /// Observations longer than this are elided in prompts and transcripts.
    pub observation_max_length: usize,
    /// How much head and tail to keep when an observation is elided.
    pub observation_length: usize,
    /// Where to write per-round prompt/response transcripts; disabled when
    /// unset.
    pub history_output_path: Option<PathBuf>,
    /// Identifies this task instance in the transcript directory.
    pub instance_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_limit: 0,
            cost_limit: 0.0,
            max_invalid: 3,
            window_size: 100,
            observation_max_length: 10_000,
            observation_length: 5_000,
            history_output_path: None,
            instance_id: "default".to_string(),
        }
    }
}

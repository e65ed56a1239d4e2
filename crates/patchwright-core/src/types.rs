//! Core types shared across the agent crates

use serde::{Deserialize, Serialize};

/// Output lines that mark a command's output as the final answer. Everything
/// after the sentinel line is the submitted text.
pub const SUBMISSION_SENTINELS: [&str; 2] = [
    "MINI_SWE_AGENT_FINAL_OUTPUT",
    "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT",
];

/// Whether a decision was declared a branching point.
///
/// Exploratory nodes are the only legal backtrack targets; everything between
/// two exploratory nodes rolls back as a group when a dead end is hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionProperty {
    Exploratory,
    Exploitative,
}

impl ActionProperty {
    /// Parse the `<property>` tag contents. Unknown values map to `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "exploratory" => Some(Self::Exploratory),
            "exploitative" => Some(Self::Exploitative),
            _ => None,
        }
    }
}

/// One executed action and its formatted observation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionObservation {
    pub action: String,
    /// Formatted as `"[returncode: N]\n<output>"`.
    pub observation: String,
}

impl ActionObservation {
    pub fn new(action: impl Into<String>, returncode: i32, output: &str) -> Self {
        Self {
            action: action.into(),
            observation: format!("[returncode: {}]\n{}", returncode, output.trim()),
        }
    }
}

/// A tool installed in the sandbox, tracked per run. `status` is opaque to
/// the core; tool responses overwrite it wholesale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstalledTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Check a command output for a submission sentinel.
///
/// The sentinel must be the first non-blank line; the returned text is
/// everything after that line, newlines preserved.
pub fn detect_submission(output: &str) -> Option<String> {
    let trimmed = output.trim_start();
    let (first, rest) = match trimmed.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (trimmed, ""),
    };
    if SUBMISSION_SENTINELS.contains(&first.trim()) {
        Some(rest.to_string())
    } else {
        None
    }
}

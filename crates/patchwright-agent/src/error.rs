//! Agent error taxonomy
//!
//! Terminal errors end the run; format and timeout faults are surfaced to
//! the model on the next iteration and never touch the tree.

use patchwright_llm::ModelError;
use patchwright_sandbox::SandboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("limits exceeded: {0}")]
    LimitsExceeded(String),

    #[error("no exploratory branch left to backtrack to: {0}")]
    NoExplorableBranch(String),

    /// Programmer error: a temp node was created while one was pending.
    #[error("a pending operation already exists")]
    PendingExists,

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! Patchwright Agent - the backtracking repair loop
//!
//! Ties the operation history tree, the code context manager, and the
//! version-control bridge into a per-iteration protocol: build a prompt from
//! tree state, query the model, reflect on the previous decision, execute the
//! new one in the sandbox, and record the resulting diff.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod prompt;
pub mod response;
pub mod transcript;
pub mod vcs;

pub use agent::DebugAgent;
pub use config::AgentConfig;
pub use error::AgentError;
pub use history::{NodeId, OperationNode, OperationTree};
pub use vcs::VersionControlBridge;

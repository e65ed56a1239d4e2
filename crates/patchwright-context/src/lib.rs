//! Patchwright Context - structure-aware code excerpting
//!
//! Builds minimal, deterministic code excerpts around the lines the agent is
//! reasoning about: whole functions when they fit a window, symmetric windows
//! otherwise, always with the enclosing `class`/`def`/branch headers included
//! so the excerpt reads like real code.

pub mod chunk;
pub mod manager;
mod ts;

pub use chunk::CodeChunk;
pub use manager::{CodeContextManager, FileSource};

//! Patchwright Core - shared types, wire protocols, and error handling

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{CoreError, Result};
pub use protocol::*;
pub use types::*;

//! Patchwright LLM - model client trait and HTTP implementations

pub mod client;
pub mod openai;
pub mod types;

pub use client::{ModelClient, ModelError, ModelResult};
pub use openai::{CostTracking, OpenAiCompatConfig, OpenAiCompatModel};
pub use types::{ChatMessage, ModelResponse, Usage};

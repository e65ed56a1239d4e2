//! Model client trait

use crate::types::{ChatMessage, ModelResponse};

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("cost tracking failed for model {model}: {message}")]
    CostTracking { model: String, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// A blocking chat model. `query` is the only call that may suspend the
/// agent loop indefinitely; retries and rate limiting live behind it.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    async fn query(&self, messages: &[ChatMessage]) -> ModelResult<ModelResponse>;

    /// Number of successful queries so far, for the step budget.
    fn n_calls(&self) -> u64;

    /// Accumulated cost in dollars, for the cost budget.
    fn cost(&self) -> f64;
}

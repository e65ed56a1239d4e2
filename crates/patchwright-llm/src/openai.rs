//! OpenAI-compatible chat-completions client with retry and cost tracking

use crate::client::{ModelClient, ModelError, ModelResult};
use crate::types::{ChatMessage, ModelResponse, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// What to do when the provider reports no usable cost information.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTracking {
    #[default]
    Default,
    IgnoreErrors,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatConfig {
    pub model_name: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Retry budget for transient failures. Auth failures never retry.
    pub max_retries: u32,
    /// Prices in dollars per million tokens; zero disables cost accounting
    /// unless `cost_tracking` demands it.
    pub prompt_price_per_mtok: f64,
    pub completion_price_per_mtok: f64,
    pub cost_tracking: CostTracking,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            max_tokens: None,
            max_retries: 10,
            prompt_price_per_mtok: 0.0,
            completion_price_per_mtok: 0.0,
            cost_tracking: CostTracking::Default,
        }
    }
}

#[derive(Debug, Default)]
struct ModelStats {
    n_calls: u64,
    cost: f64,
}

pub struct OpenAiCompatModel {
    client: Client,
    api_key: String,
    config: OpenAiCompatConfig,
    stats: Mutex<ModelStats>,
}

impl OpenAiCompatModel {
    pub fn new(api_key: impl Into<String>, config: OpenAiCompatConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            config,
            stats: Mutex::new(ModelStats::default()),
        }
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    async fn request_once(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> ModelResult<CompletionResponse> {
        let body = CompletionRequest {
            model: self.config.model_name.clone(),
            messages: messages.to_vec(),
            temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ModelError::Auth(error_text),
                429 => ModelError::RateLimited(error_text),
                _ => ModelError::Api(format!("{}: {}", status, error_text)),
            });
        }

        Ok(response.json::<CompletionResponse>().await?)
    }

    /// One logical query attempt, including the unsupported-temperature
    /// fallback: some providers reject custom temperatures and only accept 1.
    async fn query_attempt(&self, messages: &[ChatMessage]) -> ModelResult<CompletionResponse> {
        match self.request_once(messages, self.config.temperature).await {
            Err(ModelError::Api(message))
                if message.contains("temperature") && self.config.temperature.is_some() =>
            {
                debug!("retrying with temperature=1: {}", message);
                self.request_once(messages, Some(1.0)).await
            }
            other => other,
        }
    }

    fn track_cost(&self, usage: Option<&Usage>) -> ModelResult<f64> {
        let cost = usage
            .map(|u| {
                u.prompt_tokens as f64 * self.config.prompt_price_per_mtok / 1_000_000.0
                    + u.completion_tokens as f64 * self.config.completion_price_per_mtok
                        / 1_000_000.0
            })
            .unwrap_or(0.0);
        if cost <= 0.0 && self.config.cost_tracking == CostTracking::Default {
            return Err(ModelError::CostTracking {
                model: self.config.model_name.clone(),
                message: "no usage reported or prices unset; \
                          set cost_tracking to ignore_errors to proceed without cost data"
                    .to_string(),
            });
        }
        Ok(cost)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    // 4s, 8s, 16s, ... capped at 60s
    let secs = 4u64.saturating_mul(1u64 << attempt.min(8)) / 2;
    Duration::from_secs(secs.clamp(4, 60))
}

#[async_trait::async_trait]
impl ModelClient for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.config.model_name
    }

    async fn query(&self, messages: &[ChatMessage]) -> ModelResult<ModelResponse> {
        let mut attempt = 0;
        let response = loop {
            match self.query_attempt(messages).await {
                Ok(response) => break response,
                Err(err @ ModelError::Auth(_)) => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(attempt);
                    warn!(
                        "model query failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.config.max_retries, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let cost = self.track_cost(response.usage.as_ref())?;

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.n_calls += 1;
        stats.cost += cost;

        Ok(ModelResponse {
            content,
            usage: response.usage,
        })
    }

    fn n_calls(&self) -> u64 {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).n_calls
    }

    fn cost(&self) -> f64 {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).cost
    }
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

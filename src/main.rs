//! patchwright — autonomous program-repair agent
//!
//! Usage:
//!   patchwright --image IMG --model MODEL --task "description"
//!   patchwright --workspace /path/to/repo --model MODEL --task @task.md
//!
//! Runs a single repair task: the agent reproduces the defect inside the
//! sandbox, searches for a fix with backtracking, and prints the submitted
//! answer.

use anyhow::{bail, Context, Result};
use clap::Parser;
use patchwright_agent::{AgentConfig, DebugAgent};
use patchwright_llm::{CostTracking, ModelClient, OpenAiCompatConfig, OpenAiCompatModel};
use patchwright_sandbox::{DockerSandbox, DockerSandboxConfig, LocalSandbox, Sandbox};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "patchwright",
    about = "Autonomous program-repair agent with a backtracking search loop",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Problem statement, or @path to read it from a file
    #[arg(short, long)]
    task: String,

    /// Docker image to run the task in
    #[arg(long, conflicts_with = "workspace")]
    image: Option<String>,

    /// Local repository to debug instead of a container
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Working directory inside the container
    #[arg(long, default_value = "/testbed")]
    cwd: String,

    /// Model name passed to the chat-completions endpoint
    #[arg(short, long)]
    model: String,

    /// OpenAI-compatible endpoint base URL
    #[arg(long, default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// Environment variable holding the API key
    #[arg(long, default_value = "PATCHWRIGHT_API_KEY")]
    api_key_env: String,

    /// Maximum model calls (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    step_limit: u64,

    /// Maximum model cost in dollars (0 = unlimited)
    #[arg(long, default_value_t = 0.0)]
    cost_limit: f64,

    /// Input price in dollars per million tokens
    #[arg(long, default_value_t = 0.0)]
    prompt_price: f64,

    /// Output price in dollars per million tokens
    #[arg(long, default_value_t = 0.0)]
    completion_price: f64,

    /// Directory for per-round prompt/response transcripts
    #[arg(long)]
    history_output_path: Option<PathBuf>,

    /// Task instance identifier used in transcript paths
    #[arg(long, default_value = "default")]
    instance_id: String,

    /// Agent config file (JSON) providing defaults for the flags above
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let task = if let Some(path) = cli.task.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("reading task file {path}"))?
    } else {
        cli.task.clone()
    };

    let mut agent_config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<AgentConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AgentConfig::default(),
    };
    agent_config.step_limit = cli.step_limit;
    agent_config.cost_limit = cli.cost_limit;
    agent_config.instance_id = cli.instance_id.clone();
    if cli.history_output_path.is_some() {
        agent_config.history_output_path = cli.history_output_path.clone();
    }

    let api_key = std::env::var(&cli.api_key_env).unwrap_or_default();
    let pricing_configured = cli.prompt_price > 0.0 || cli.completion_price > 0.0;
    let model = OpenAiCompatModel::new(
        api_key,
        OpenAiCompatConfig {
            model_name: cli.model.clone(),
            base_url: cli.base_url.clone(),
            prompt_price_per_mtok: cli.prompt_price,
            completion_price_per_mtok: cli.completion_price,
            cost_tracking: if pricing_configured {
                CostTracking::Default
            } else {
                CostTracking::IgnoreErrors
            },
            ..Default::default()
        },
    );
    let model: Arc<dyn ModelClient> = Arc::new(model);

    let sandbox: Arc<dyn Sandbox> = match (&cli.image, &cli.workspace) {
        (Some(image), None) => {
            let sandbox = DockerSandbox::start(DockerSandboxConfig {
                image: image.clone(),
                cwd: cli.cwd.clone(),
                ..Default::default()
            })
            .await
            .context("starting docker sandbox")?;
            Arc::new(sandbox)
        }
        (None, Some(workspace)) => Arc::new(LocalSandbox::new(workspace)),
        _ => bail!("exactly one of --image or --workspace is required"),
    };

    let mut agent = DebugAgent::new(model.clone(), sandbox, agent_config);
    match agent.run(&task).await {
        Ok(submission) => {
            println!("{submission}");
            tracing::info!(
                "run complete: calls={} cost=${:.4}",
                model.n_calls(),
                model.cost()
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!("run failed: {err}");
            Err(err.into())
        }
    }
}

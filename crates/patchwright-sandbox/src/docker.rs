//! Docker container sandbox

use crate::{run_with_timeout, ExecOutcome, Sandbox, SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSandboxConfig {
    pub image: String,
    /// Working directory in which to execute commands.
    pub cwd: String,
    /// Environment variables to set in the container.
    pub env: BTreeMap<String, String>,
    /// Host environment variables to forward into the container. Only
    /// forwarded when set on the host; `env` wins on conflict.
    pub forward_env: Vec<String>,
    /// Per-command timeout in seconds.
    pub timeout: u64,
    /// Path to the docker/container executable.
    pub executable: String,
    /// Extra arguments for `docker run`.
    pub run_args: Vec<String>,
    /// Max container lifetime, in `sleep` format.
    pub container_timeout: String,
    /// Timeout in seconds for `docker run` (image pulls can be slow).
    pub pull_timeout: u64,
    /// Whether the container carries a prepared reproduction script.
    pub reproduction_complete: bool,
    /// Reproduction script settings; `target` names the script file.
    pub reproduction_script: BTreeMap<String, String>,
}

impl Default for DockerSandboxConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            cwd: "/".to_string(),
            env: BTreeMap::new(),
            forward_env: Vec::new(),
            timeout: 30,
            executable: std::env::var("PATCHWRIGHT_DOCKER_EXECUTABLE")
                .unwrap_or_else(|_| "docker".to_string()),
            run_args: vec!["--rm".to_string()],
            container_timeout: "2h".to_string(),
            pull_timeout: 1200,
            reproduction_complete: false,
            reproduction_script: BTreeMap::new(),
        }
    }
}

pub struct DockerSandbox {
    config: DockerSandboxConfig,
    container_id: String,
    extra_vars: serde_json::Map<String, serde_json::Value>,
}

impl DockerSandbox {
    /// Start a container and wait for it to come up.
    pub async fn start(config: DockerSandboxConfig) -> SandboxResult<Self> {
        let container_name = format!("patchwright-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let mut command = Command::new(&config.executable);
        command
            .arg("run")
            .arg("-d")
            .arg("--name")
            .arg(&container_name)
            .arg("-w")
            .arg(&config.cwd)
            .args(&config.run_args)
            .arg(&config.image)
            .arg("sleep")
            .arg(&config.container_timeout);

        debug!("starting container {}", container_name);
        let outcome =
            run_with_timeout(command, Duration::from_secs(config.pull_timeout)).await?;
        if outcome.returncode != 0 {
            return Err(SandboxError::Setup(format!(
                "docker run failed: {}",
                outcome.output.trim()
            )));
        }
        let container_id = outcome.output.trim().to_string();
        info!("started container {} with id {}", container_name, container_id);

        Ok(Self {
            config,
            container_id,
            extra_vars: serde_json::Map::new(),
        })
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Record an extra template variable (e.g. `installed_tools`).
    pub fn set_extra_var(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extra_vars.insert(key.into(), value);
    }

    fn exec_command(&self, command: &str, cwd: &str) -> Command {
        let mut cmd = Command::new(&self.config.executable);
        cmd.arg("exec").arg("-w").arg(cwd);
        for key in &self.config.forward_env {
            if let Ok(value) = std::env::var(key) {
                cmd.arg("-e").arg(format!("{key}={value}"));
            }
        }
        for (key, value) in &self.config.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&self.container_id).arg("bash").arg("-lc").arg(command);
        cmd
    }
}

#[async_trait::async_trait]
impl Sandbox for DockerSandbox {
    async fn execute_in(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecOutcome> {
        let cwd = cwd.unwrap_or(&self.config.cwd);
        let timeout = timeout.unwrap_or(Duration::from_secs(self.config.timeout));
        run_with_timeout(self.exec_command(command, cwd), timeout).await
    }

    async fn get_file(&self, path: &str) -> String {
        let tmp = std::env::temp_dir().join(format!(
            "patchwright-cp-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let mut content = String::new();
        for attempt in 1..=3 {
            let mut cmd = Command::new(&self.config.executable);
            cmd.arg("cp")
                .arg(format!("{}:{}", self.container_id, path))
                .arg(&tmp);
            match run_with_timeout(cmd, Duration::from_secs(60)).await {
                Ok(outcome) if outcome.returncode == 0 => {
                    content = tokio::fs::read_to_string(&tmp).await.unwrap_or_default();
                    break;
                }
                Ok(outcome) => {
                    warn!(
                        "docker cp failed (attempt {}/3): {}",
                        attempt,
                        outcome.output.trim()
                    );
                }
                Err(err) => {
                    warn!("docker cp failed (attempt {}/3): {}", attempt, err);
                }
            }
        }
        let _ = tokio::fs::remove_file(&tmp).await;
        content
    }

    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut vars = match serde_json::to_value(&self.config) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in &self.extra_vars {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }

    fn cwd(&self) -> &str {
        &self.config.cwd
    }
}

impl Drop for DockerSandbox {
    fn drop(&mut self) {
        if self.container_id.is_empty() {
            return;
        }
        let line = format!(
            "(timeout 60 {exe} stop {id} || {exe} rm -f {id}) >/dev/null 2>&1 &",
            exe = self.config.executable,
            id = self.container_id
        );
        let _ = std::process::Command::new("bash").args(["-c", &line]).spawn();
    }
}

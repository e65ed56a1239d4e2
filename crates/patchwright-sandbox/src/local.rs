//! Host-shell sandbox for tests and local development

use crate::{run_with_timeout, ExecOutcome, Sandbox, SandboxResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Runs commands directly on the host with a fixed working directory.
/// Shares the `Sandbox` contract with the Docker implementation so the agent
/// can be exercised against a plain checkout.
pub struct LocalSandbox {
    cwd: PathBuf,
    cwd_str: String,
    timeout: Duration,
    extra_vars: serde_json::Map<String, serde_json::Value>,
}

impl LocalSandbox {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        let cwd = cwd.as_ref().to_path_buf();
        let cwd_str = cwd.to_string_lossy().into_owned();
        Self {
            cwd,
            cwd_str,
            timeout: Duration::from_secs(120),
            extra_vars: serde_json::Map::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_extra_var(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extra_vars.insert(key.into(), value);
    }
}

#[async_trait::async_trait]
impl Sandbox for LocalSandbox {
    async fn execute_in(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecOutcome> {
        let mut cmd = Command::new("bash");
        cmd.args(["-lc", command])
            .current_dir(cwd.map(Path::new).unwrap_or(&self.cwd));
        run_with_timeout(cmd, timeout.unwrap_or(self.timeout)).await
    }

    async fn get_file(&self, path: &str) -> String {
        let resolved = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        };
        tokio::fs::read_to_string(resolved).await.unwrap_or_default()
    }

    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut vars = serde_json::Map::new();
        vars.insert("cwd".to_string(), serde_json::Value::String(self.cwd_str.clone()));
        vars.insert(
            "installed_tools".to_string(),
            serde_json::Value::Array(Vec::new()),
        );
        for (key, value) in &self.extra_vars {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }

    fn cwd(&self) -> &str {
        &self.cwd_str
    }
}

//! Patchwright Sandbox - isolated command execution for the agent
//!
//! The agent only ever talks to a `Sandbox`: a shell with a working
//! directory, a file reader, and a bag of template variables. The Docker
//! implementation is the production path; `LocalSandbox` runs against the
//! host for tests and development.

pub mod docker;
pub mod local;

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

pub use docker::{DockerSandbox, DockerSandboxConfig};
pub use local::LocalSandbox;

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("command timed out after {seconds}s")]
    Timeout {
        seconds: u64,
        /// Whatever the command printed before it was killed.
        output: String,
    },

    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("sandbox setup failed: {0}")]
    Setup(String),
}

/// Result of one command execution; stderr is merged after stdout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub output: String,
    pub returncode: i32,
}

/// The execution environment contract the agent depends on.
#[async_trait::async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `command` under a shell in the sandbox's working directory.
    async fn execute(&self, command: &str) -> SandboxResult<ExecOutcome> {
        self.execute_in(command, None, None).await
    }

    /// Run with an explicit working directory and/or timeout override.
    async fn execute_in(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecOutcome>;

    /// Read a file out of the sandbox. Returns `""` on failure after
    /// bounded retries; callers treat missing files as empty.
    async fn get_file(&self, path: &str) -> String;

    /// Configuration and installed-tools variables exposed to prompts.
    fn template_vars(&self) -> serde_json::Map<String, serde_json::Value>;

    fn cwd(&self) -> &str;
}

/// Spawn `command`, enforce `timeout`, and capture stdout + stderr even when
/// the command is killed mid-write.
///
/// Readers append into shared buffers so partial output survives a kill.
/// Draining is bounded by a grace period: orphaned grandchildren can hold
/// the pipes open after the shell itself has exited.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> SandboxResult<ExecOutcome> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    command.kill_on_drop(true);
    let mut child = command.spawn()?;

    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let stdout_task = spawn_reader(child.stdout.take(), stdout_buf.clone());
    let stderr_task = spawn_reader(child.stderr.take(), stderr_buf.clone());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(waited) => waited?,
        Err(_) => {
            let _ = child.kill().await;
            let _ = tokio::time::timeout(
                Duration::from_millis(200),
                async {
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                },
            )
            .await;
            return Err(SandboxError::Timeout {
                seconds: timeout.as_secs(),
                output: combine_output(&stdout_buf, &stderr_buf),
            });
        }
    };

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = stdout_task.await;
        let _ = stderr_task.await;
    })
    .await;
    Ok(ExecOutcome {
        output: combine_output(&stdout_buf, &stderr_buf),
        returncode: status.code().unwrap_or(-1),
    })
}

fn spawn_reader(
    pipe: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>,
    buf: Arc<Mutex<Vec<u8>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(&chunk[..n]),
            }
        }
    })
}

fn combine_output(stdout: &Mutex<Vec<u8>>, stderr: &Mutex<Vec<u8>>) -> String {
    let stdout = stdout.lock().unwrap_or_else(|e| e.into_inner());
    let stderr = stderr.lock().unwrap_or_else(|e| e.into_inner());
    let mut output = String::from_utf8_lossy(&stdout).into_owned();
    if !stderr.is_empty() {
        output.push_str(&String::from_utf8_lossy(&stderr));
    }
    output
}

//! Version-control bridge
//!
//! Makes tree-node transitions correspond to working-tree states: every
//! executed action captures a diff, and committing or backtracking replays
//! the stored diff onto a clean tree. Patches travel through the sandbox's
//! command primitive base64-encoded to avoid shell quoting pitfalls.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use patchwright_sandbox::{Sandbox, SandboxResult};
use std::sync::Arc;
use tracing::debug;

pub struct VersionControlBridge {
    sandbox: Arc<dyn Sandbox>,
}

impl VersionControlBridge {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Unified diff of the working tree against HEAD, untracked files
    /// included via intent-to-add. Empty when git reports a failure.
    pub async fn capture(&self) -> SandboxResult<String> {
        self.sandbox.execute("git add -N .").await?;
        let result = self.sandbox.execute("git --no-pager diff HEAD").await?;
        if result.returncode != 0 {
            return Ok(String::new());
        }
        Ok(result.output)
    }

    pub async fn apply_patch(&self, diff: &str) -> SandboxResult<()> {
        let encoded = BASE64.encode(diff.as_bytes());
        let command = format!(
            "printf '%s' '{encoded}' | base64 -d > /tmp/_vc_patch.diff && \
             git apply --whitespace=nowarn /tmp/_vc_patch.diff ; \
             rm -f /tmp/_vc_patch.diff"
        );
        self.sandbox.execute(&command).await?;
        Ok(())
    }

    /// Ensure the working tree reflects `code_change`: no-op when the
    /// on-disk diff already matches, otherwise reset to HEAD and re-apply.
    pub async fn sync_to(&self, code_change: &str) -> SandboxResult<()> {
        let current = self.capture().await?;
        if current == code_change {
            return Ok(());
        }
        debug!("working tree diverged, resetting to HEAD");
        self.sandbox
            .execute("git reset --hard HEAD && git clean -fd")
            .await?;
        if !code_change.is_empty() {
            self.apply_patch(code_change).await?;
        }
        Ok(())
    }
}

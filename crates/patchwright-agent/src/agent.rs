//! The per-iteration repair loop

use crate::config::AgentConfig;
use crate::dispatch::{self, BuiltinCall};
use crate::error::AgentError;
use crate::history::{OperationNode, OperationTree};
use crate::prompt::{self, IncomingOperation};
use crate::response;
use crate::transcript::{format_prompt_text, Transcript};
use crate::vcs::VersionControlBridge;
use patchwright_core::{
    detect_submission, ActionObservation, ActionProperty, InstalledTool, ToolResponse,
};
use patchwright_context::{CodeChunk, CodeContextManager, FileSource};
use patchwright_llm::{ChatMessage, ModelClient};
use patchwright_sandbox::{ExecOutcome, Sandbox, SandboxError};
use std::sync::Arc;
use tracing::info;

struct SandboxFiles(Arc<dyn Sandbox>);

#[async_trait::async_trait]
impl FileSource for SandboxFiles {
    async fn get_file(&self, path: &str) -> String {
        self.0.get_file(path).await
    }
}

enum StepFlow {
    Continue,
    Submitted(String),
}

enum StepFault {
    /// The response carried no action; surfaced to the model next turn.
    Format(String),
    /// A command hit the sandbox timeout; surfaced to the model next turn.
    Timeout(String),
    Fatal(AgentError),
}

impl From<AgentError> for StepFault {
    fn from(err: AgentError) -> Self {
        StepFault::Fatal(err)
    }
}

impl From<SandboxError> for StepFault {
    fn from(err: SandboxError) -> Self {
        StepFault::Fatal(AgentError::Sandbox(err))
    }
}

enum CommandOutcome {
    Output { output: String, returncode: i32 },
    Submitted(String),
    TimedOut { message: String, partial: String },
}

pub struct DebugAgent {
    model: Arc<dyn ModelClient>,
    sandbox: Arc<dyn Sandbox>,
    config: AgentConfig,
    tree: OperationTree,
    context: CodeContextManager,
    vcs: VersionControlBridge,
    transcript: Option<Transcript>,
    installed_tools: Vec<InstalledTool>,
    default_chunks: Vec<CodeChunk>,
    n_operations: usize,
    pending_feedback: Vec<String>,
    task: String,
}

impl DebugAgent {
    pub fn new(model: Arc<dyn ModelClient>, sandbox: Arc<dyn Sandbox>, config: AgentConfig) -> Self {
        let vars = sandbox.template_vars();
        let installed_tools = vars
            .get("installed_tools")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        let context = CodeContextManager::new(
            Arc::new(SandboxFiles(sandbox.clone())),
            sandbox.cwd().to_string(),
        );
        let vcs = VersionControlBridge::new(sandbox.clone());
        Self {
            model,
            sandbox,
            tree: OperationTree::new(config.max_invalid),
            context,
            vcs,
            transcript: None,
            installed_tools,
            default_chunks: Vec::new(),
            n_operations: 0,
            pending_feedback: Vec::new(),
            task: String::new(),
            config,
        }
    }

    pub fn tree(&self) -> &OperationTree {
        &self.tree
    }

    pub fn installed_tools(&self) -> &[InstalledTool] {
        &self.installed_tools
    }

    pub fn context(&self) -> &CodeContextManager {
        &self.context
    }

    /// Drive the loop until a terminal outcome. `Ok` carries the submitted
    /// answer; format and timeout faults are fed back to the model and the
    /// loop continues.
    pub async fn run(&mut self, task: &str) -> Result<String, AgentError> {
        self.task = task.to_string();
        self.transcript = match &self.config.history_output_path {
            Some(base) => Some(Transcript::prepare(base, &self.config.instance_id)?),
            None => None,
        };
        self.init_default_chunks().await;
        loop {
            match self.step().await {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Submitted(text)) => return Ok(text),
                Err(StepFault::Format(message)) => {
                    info!("step={} fault=format", self.round_index());
                    self.pending_feedback.push(message);
                }
                Err(StepFault::Timeout(message)) => {
                    info!("step={} fault=timeout", self.round_index());
                    self.pending_feedback.push(message);
                }
                Err(StepFault::Fatal(err)) => {
                    info!("step={} fault=terminal error={}", self.round_index(), err);
                    return Err(err);
                }
            }
        }
    }

    fn round_index(&self) -> usize {
        self.n_operations + 1
    }

    /// Preload the reproduction script into the default code context when
    /// the sandbox reports it as prepared.
    async fn init_default_chunks(&mut self) {
        self.default_chunks.clear();
        let vars = self.sandbox.template_vars();
        let complete = vars
            .get("reproduction_complete")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let target = vars
            .get("reproduction_script")
            .and_then(|v| v.get("target"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("")
            .to_string();
        if !complete || target.is_empty() {
            return;
        }
        if let Some(chunk) = self.context.whole_file_chunk(&target).await {
            self.default_chunks.push(chunk);
        }
    }

    fn check_limits(&self) -> Result<(), StepFault> {
        let n_calls = self.model.n_calls();
        if self.config.step_limit > 0 && n_calls >= self.config.step_limit {
            return Err(AgentError::LimitsExceeded(format!(
                "model call limit reached after {n_calls} calls"
            ))
            .into());
        }
        let cost = self.model.cost();
        if self.config.cost_limit > 0.0 && cost >= self.config.cost_limit {
            return Err(AgentError::LimitsExceeded(format!(
                "cost limit reached at ${cost:.2}"
            ))
            .into());
        }
        Ok(())
    }

    async fn step(&mut self) -> Result<StepFlow, StepFault> {
        self.check_limits()?;
        let round_index = self.round_index();
        let has_incoming = self.tree.has_pending();

        let system = prompt::system_message(&self.task, has_incoming, &self.installed_tools);
        let user = self.build_user_message(has_incoming).await;
        self.pending_feedback.clear();

        if let Some(transcript) = &self.transcript {
            transcript.save(round_index, "prompt", &format_prompt_text(&system, &user));
        }

        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .model
            .query(&messages)
            .await
            .map_err(AgentError::from)?;
        let content = response.content;

        if has_incoming {
            self.process_reflection(&content, round_index).await?;
        }
        self.process_action(&content, round_index).await
    }

    async fn build_user_message(&self, has_incoming: bool) -> String {
        let mut chunks = self.default_chunks.clone();
        for id in self.tree.path_from_root_to_current() {
            chunks.extend(self.tree.node(id).code_chunks.iter().cloned());
        }
        let code_context = self.context.render(&chunks).await;

        let rejected_nodes: Vec<&OperationNode> = self
            .tree
            .rejected_actions()
            .into_iter()
            .map(|id| self.tree.node(id))
            .collect();
        let rejected = prompt::render_rejected(&rejected_nodes);

        let current_node = self
            .tree
            .has_real_current()
            .then(|| self.tree.node(self.tree.current()));
        let version_control = prompt::render_version_control(current_node);

        let chain_nodes: Vec<&OperationNode> = self
            .tree
            .reasoning_chain()
            .into_iter()
            .map(|id| self.tree.node(id))
            .collect();
        let history = prompt::render_chain(&chain_nodes);

        let incoming = if has_incoming {
            Some(self.render_incoming_operation().await)
        } else {
            None
        };

        prompt::user_message(
            &code_context,
            &rejected,
            &version_control,
            &history,
            incoming.as_ref(),
            &self.pending_feedback,
        )
    }

    async fn render_incoming_operation(&self) -> IncomingOperation {
        let Some(pending) = self.tree.pending() else {
            return IncomingOperation {
                thoughts: String::new(),
                observations: String::new(),
                accessed_code: String::new(),
                incoming_code_change: String::new(),
            };
        };
        let node = self.tree.node(pending);
        let accessed_code = self.context.render(&node.code_chunks).await;
        let current_change = if self.tree.has_real_current() {
            self.tree.node(self.tree.current()).code_change.as_str()
        } else {
            ""
        };
        let incoming_code_change = if node.code_change != current_change {
            node.code_change.clone()
        } else {
            String::new()
        };
        IncomingOperation {
            thoughts: node.thoughts.clone(),
            observations: prompt::format_observations(
                &node.observations,
                self.config.observation_max_length,
                self.config.observation_length,
            ),
            accessed_code,
            incoming_code_change,
        }
    }

    async fn process_reflection(
        &mut self,
        content: &str,
        round_index: usize,
    ) -> Result<(), StepFault> {
        let decision = response::parse_tag(content, "decision").to_lowercase();
        let summary = response::parse_tag(content, "summary");
        let lessons = response::parse_tag(content, "lessons");
        let valid = decision != "reject";
        self.tree.set_reflection(valid, lessons, summary);
        info!(
            "step={} phase=reflection decision={}",
            round_index,
            if valid { "accept" } else { "reject" }
        );

        if valid {
            self.tree.commit_admissible();
            self.propagate_tool_status();
            let code_change = self.tree.node(self.tree.current()).code_change.clone();
            self.vcs.sync_to(&code_change).await?;
        } else {
            let overflow = self.tree.commit_invalid();
            if overflow {
                self.handle_dead_end(round_index).await?;
            }
        }
        Ok(())
    }

    /// Dead-end protocol: roll the working branch back to the nearest
    /// exploratory ancestor, or give up when there is none.
    async fn handle_dead_end(&mut self, round_index: usize) -> Result<(), StepFault> {
        let Some(target) = self.tree.find_backtrack_target() else {
            return Err(AgentError::NoExplorableBranch(format!(
                "{} consecutive rejected operations and no exploratory ancestor",
                self.config.max_invalid
            ))
            .into());
        };
        let summary = self.aggregate_dead_end_summary();
        info!("step={} phase=backtrack", round_index);
        self.tree.backtrack_to(target, summary);
        let code_change = self.tree.node(target).code_change.clone();
        self.vcs.sync_to(&code_change).await?;
        Ok(())
    }

    fn aggregate_dead_end_summary(&self) -> String {
        let current = self.tree.current();
        let invalid_ops = &self.tree.node(current).invalid_ops;
        let mut parts = vec![format!(
            "Abandoned after {} rejected attempts:",
            invalid_ops.len()
        )];
        for &id in invalid_ops {
            let node = self.tree.node(id);
            let line = if node.summary.is_empty() {
                &node.thoughts
            } else {
                &node.summary
            };
            parts.push(format!("- {line}"));
        }
        parts.join("\n")
    }

    /// Push the committed node's tool statuses into the installed registry.
    fn propagate_tool_status(&mut self) {
        if !self.tree.has_real_current() {
            return;
        }
        let statuses: Vec<(String, serde_json::Value)> = self
            .tree
            .node(self.tree.current())
            .tool_status
            .iter()
            .map(|(name, status)| (name.clone(), status.clone()))
            .collect();
        for (name, status) in statuses {
            if let Some(tool) = self.installed_tools.iter_mut().find(|t| t.name == name) {
                tool.status = Some(status);
            }
        }
    }

    async fn process_action(
        &mut self,
        content: &str,
        round_index: usize,
    ) -> Result<StepFlow, StepFault> {
        let thoughts = response::parse_tag(content, "thoughts");
        let actions = response::parse_actions(content);
        let property = ActionProperty::parse(&response::parse_tag(content, "property"));
        info!(
            "step={} phase=action property={:?} n_actions={}",
            round_index,
            property,
            actions.len()
        );

        if actions.is_empty() {
            return Err(StepFault::Format(
                "Your response did not contain any <action>...</action> block. \
                 Every response must propose at least one command."
                    .to_string(),
            ));
        }

        self.tree
            .create_temp_node(thoughts, actions.join("\n"), property)?;
        self.n_operations += 1;

        let mut observations: Vec<ActionObservation> = Vec::new();
        let mut fault: Option<StepFault> = None;
        let mut last_returncode = 0;
        for action in &actions {
            match self.execute_command(action).await? {
                CommandOutcome::Submitted(text) => {
                    if let Some(transcript) = &self.transcript {
                        transcript.save(round_index, "response", "Submitted");
                    }
                    self.tree.set_observation(observations);
                    return Ok(StepFlow::Submitted(text));
                }
                CommandOutcome::TimedOut { message, partial } => {
                    let combined = if partial.is_empty() {
                        message
                    } else {
                        format!("{message}\n{partial}")
                    };
                    observations.push(ActionObservation::new(action.clone(), -1, &combined));
                    fault = Some(StepFault::Timeout(combined));
                    last_returncode = -1;
                    break;
                }
                CommandOutcome::Output { output, returncode } => {
                    observations.push(ActionObservation::new(action.clone(), returncode, &output));
                    last_returncode = returncode;
                    if returncode != 0 {
                        break;
                    }
                }
            }
        }

        self.tree.set_observation(observations.clone());
        let diff = self.vcs.capture().await?;
        if let Some(active) = self.tree.active_node() {
            self.tree.node_mut(active).code_change = diff;
        }

        let formatted = prompt::format_observations(
            &observations,
            self.config.observation_max_length,
            self.config.observation_length,
        );
        if let Some(transcript) = &self.transcript {
            transcript.save(round_index, "response", &format!("{content}\n\n{formatted}"));
        }
        info!(
            "step={} phase=action returncode={}",
            round_index, last_returncode
        );

        match fault {
            Some(fault) => Err(fault),
            None => Ok(StepFlow::Continue),
        }
    }

    async fn execute_command(&mut self, command: &str) -> Result<CommandOutcome, StepFault> {
        if let Some(builtin) = dispatch::parse_builtin(command) {
            return Ok(self.run_builtin(builtin).await);
        }
        let outcome = match self.sandbox.execute(command).await {
            Ok(outcome) => outcome,
            Err(SandboxError::Timeout { seconds, output }) => {
                return Ok(CommandOutcome::TimedOut {
                    message: format!("The command timed out after {seconds}s."),
                    partial: output,
                });
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(rest) = detect_submission(&outcome.output) {
            return Ok(CommandOutcome::Submitted(rest));
        }
        let (output, returncode) = self.process_tool_responses(&outcome).await;
        Ok(CommandOutcome::Output { output, returncode })
    }

    async fn run_builtin(&mut self, call: Result<BuiltinCall, String>) -> CommandOutcome {
        let call = match call {
            Ok(call) => call,
            Err(usage) => {
                return CommandOutcome::Output {
                    output: usage,
                    returncode: 2,
                }
            }
        };
        let chunk = match call {
            BuiltinCall::NearbyCodeContext {
                file_path,
                line_number,
                window_size,
            } => {
                self.context
                    .get_nearby_code_context(&file_path, line_number, window_size)
                    .await
            }
            BuiltinCall::CodeLines {
                file_path,
                start,
                end,
            } => self.context.get_code_lines(&file_path, start, end).await,
        };
        let summary = dispatch::chunk_summary(&chunk);
        self.attach_chunk(chunk);
        CommandOutcome::Output {
            output: summary,
            returncode: 0,
        }
    }

    /// Fold structured tool responses into the raw output: concatenated
    /// outputs, the last reported return code, status updates, and any code
    /// context the tool asked to load.
    async fn process_tool_responses(&mut self, raw: &ExecOutcome) -> (String, i32) {
        let responses = ToolResponse::parse_all(&raw.output);
        if responses.is_empty() {
            return (raw.output.trim().to_string(), raw.returncode);
        }
        let output = responses
            .iter()
            .map(|tr| tr.output.clone().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");
        let returncode = responses
            .last()
            .and_then(|tr| tr.returncode)
            .unwrap_or(raw.returncode);

        for tr in &responses {
            let Some(refs) = &tr.code_context else {
                continue;
            };
            for code_ref in refs {
                let Some(file_path) = code_ref.file_path.as_deref() else {
                    continue;
                };
                let Some(line) = code_ref.line_number else {
                    continue;
                };
                if line < 1 {
                    continue;
                }
                let chunk = self
                    .context
                    .get_nearby_code_context(file_path, line as usize, self.config.window_size)
                    .await;
                self.attach_chunk(chunk);
            }
        }
        self.apply_tool_status_updates(&responses);
        (output, returncode)
    }

    fn apply_tool_status_updates(&mut self, responses: &[ToolResponse]) {
        let active = self.tree.active_node();
        for tr in responses {
            let (Some(package), Some(status)) = (&tr.package_name, &tr.status) else {
                continue;
            };
            if let Some(id) = active {
                self.tree
                    .node_mut(id)
                    .tool_status
                    .insert(package.clone(), status.clone());
            }
            if let Some(tool) = self.installed_tools.iter_mut().find(|t| &t.name == package) {
                tool.status = Some(status.clone());
            }
        }
    }

    /// Attach a chunk to the active node, deduplicating by identity.
    fn attach_chunk(&mut self, chunk: CodeChunk) {
        let Some(active) = self.tree.active_node() else {
            return;
        };
        let key = chunk.key();
        let chunks = &mut self.tree.node_mut(active).code_chunks;
        if chunks.iter().any(|existing| existing.key() == key) {
            return;
        }
        chunks.push(chunk);
    }
}

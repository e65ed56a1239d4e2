//! Prompt assembly
//!
//! Prompts are rebuilt from scratch every iteration out of tree state, so
//! the rendering here must be deterministic: same tree, same prompt.

use crate::history::OperationNode;
use patchwright_core::{ActionObservation, InstalledTool};

/// Summary of the pending, unreflected operation shown for reflection.
pub struct IncomingOperation {
    pub thoughts: String,
    pub observations: String,
    pub accessed_code: String,
    /// Diff delta versus the current node; empty when nothing changed.
    pub incoming_code_change: String,
}

pub fn system_message(task: &str, has_incoming: bool, installed_tools: &[InstalledTool]) -> String {
    let mut parts = vec![format!(
        "You are an autonomous debugging agent operating in a sandboxed repository. \
         Your goal is to reproduce, diagnose, and fix the defect described below, \
         then submit your final answer.\n\n# Task\n{task}"
    )];
    parts.push(tool_usage_section(installed_tools));
    if has_incoming {
        parts.push(
            "# Reflection\n\
             Your previous operation is shown in the incoming-operation section. \
             Judge whether it moved the investigation forward. Respond with \
             <decision>accept</decision> or <decision>reject</decision>, a short \
             <summary>...</summary> of what the operation established, and \
             <lessons>...</lessons> worth remembering. Rejected operations are \
             discarded from the active chain."
                .to_string(),
        );
    }
    parts.push(
        "# Actions\n\
         Think in <thoughts>...</thoughts>, then propose one or more shell commands, \
         each in its own <action>...</action> block. Actions run in order and stop at \
         the first failure. Mark the decision <property>exploratory</property> when it \
         opens a new line of investigation that may need to be rolled back, or \
         <property>exploitative</property> when it follows the current line."
            .to_string(),
    );
    parts.push(
        "# Response format\n\
         Use exactly the tags described above. Command contents may be wrapped in \
         backticks or a fenced code block. To submit the final answer, emit a command \
         whose output starts with COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT followed by \
         the answer."
            .to_string(),
    );
    parts.join("\n\n")
}

fn tool_usage_section(installed_tools: &[InstalledTool]) -> String {
    let mut lines = vec![
        "# Tools".to_string(),
        "Built-in context tools (handled outside the shell):".to_string(),
        "- get-nearby-code-context <file_path> <line_number> [window_size]: load the \
         code around a line into the code context."
            .to_string(),
        "- get-code-lines <file_path> <start> <end>: load an explicit line range into \
         the code context."
            .to_string(),
    ];
    if !installed_tools.is_empty() {
        lines.push("Installed sandbox tools:".to_string());
        for tool in installed_tools {
            match &tool.status {
                Some(status) => lines.push(format!("- {} (status: {})", tool.name, status)),
                None => lines.push(format!("- {}", tool.name)),
            }
        }
    }
    lines.join("\n")
}

pub fn user_message(
    code_context: &str,
    rejected: &str,
    version_control: &str,
    history: &str,
    incoming: Option<&IncomingOperation>,
    feedback: &[String],
) -> String {
    let mut sections = vec![
        format!("# Code context\n{}", non_empty(code_context, "(no code loaded yet)")),
        format!("# Rejected operations\n{}", non_empty(rejected, "(none)")),
        format!("# Version control\n{}", non_empty(version_control, "(clean working tree)")),
        format!("# Operation history\n{}", non_empty(history, "(no operations yet)")),
    ];
    if let Some(op) = incoming {
        sections.push(render_incoming(op));
    }
    if !feedback.is_empty() {
        sections.push(format!("# Errors from the previous turn\n{}", feedback.join("\n\n")));
    }
    sections.join("\n\n")
}

fn non_empty<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    if text.trim().is_empty() {
        fallback
    } else {
        text
    }
}

fn render_incoming(op: &IncomingOperation) -> String {
    let mut lines = vec![
        "# Incoming operation (awaiting your reflection)".to_string(),
        format!("[thoughts]\n{}", op.thoughts),
        format!("[observations]\n{}", non_empty(&op.observations, "(no observations)")),
    ];
    if !op.accessed_code.trim().is_empty() {
        lines.push(format!("[newly accessed code]\n{}", op.accessed_code));
    }
    if !op.incoming_code_change.trim().is_empty() {
        lines.push(format!("[incoming code change]\n{}", op.incoming_code_change));
    }
    lines.join("\n\n")
}

/// Reasoning chain rendered root-first. Committed nodes show their
/// reflection summary when one exists, falling back to raw thoughts.
pub fn render_chain(nodes: &[&OperationNode]) -> String {
    let mut parts = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        let what = if node.summary.is_empty() {
            &node.thoughts
        } else {
            &node.summary
        };
        let mut entry = format!("{}. {}\n   action: {}", index + 1, what, node.action);
        if !node.lessons.is_empty() {
            entry.push_str(&format!("\n   lessons: {}", node.lessons));
        }
        if !node.dead_path_summaries.is_empty() {
            for summary in &node.dead_path_summaries {
                entry.push_str(&format!("\n   abandoned branch: {}", summary));
            }
        }
        parts.push(entry);
    }
    parts.join("\n")
}

pub fn render_rejected(nodes: &[&OperationNode]) -> String {
    let mut parts = Vec::new();
    for node in nodes {
        let mut entry = format!("- action: {}", node.action);
        if !node.lessons.is_empty() {
            entry.push_str(&format!("\n  lessons: {}", node.lessons));
        }
        parts.push(entry);
    }
    parts.join("\n")
}

pub fn render_version_control(current: Option<&OperationNode>) -> String {
    match current {
        Some(node) if !node.code_change.is_empty() => {
            format!("Current working-tree diff:\n{}", node.code_change)
        }
        _ => String::new(),
    }
}

/// `[action] .. [observation] ..` pairs, long observations elided in the
/// middle.
pub fn format_observations(
    observations: &[ActionObservation],
    max_length: usize,
    keep_length: usize,
) -> String {
    observations
        .iter()
        .map(|obs| {
            format!(
                "[action] {}\n[observation]\n{}",
                obs.action,
                elide_middle(&obs.observation, max_length, keep_length)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn elide_middle(text: &str, max_length: usize, keep_length: usize) -> String {
    if max_length == 0 || text.len() <= max_length {
        return text.to_string();
    }
    let head_end = floor_char_boundary(text, keep_length);
    let tail_start = ceil_char_boundary(text, text.len().saturating_sub(keep_length));
    if tail_start <= head_end {
        return text.to_string();
    }
    let elided = tail_start - head_end;
    format!(
        "{}\n... [{} characters elided] ...\n{}",
        &text[..head_end],
        elided,
        &text[tail_start..]
    )
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elide_keeps_head_and_tail() {
        let text = "a".repeat(100) + &"b".repeat(100);
        let elided = elide_middle(&text, 50, 10);
        assert!(elided.starts_with("aaaaaaaaaa\n"));
        assert!(elided.ends_with("\nbbbbbbbbbb"));
        assert!(elided.contains("characters elided"));
    }

    #[test]
    fn short_observations_untouched() {
        assert_eq!(elide_middle("short", 100, 10), "short");
    }

    #[test]
    fn format_observations_pairs_action_and_output() {
        let obs = vec![
            ActionObservation::new("ls", 0, "a.py"),
            ActionObservation::new("cat a.py", 1, "boom"),
        ];
        let formatted = format_observations(&obs, 10_000, 5_000);
        assert!(formatted.contains("[action] ls"));
        assert!(formatted.contains("[returncode: 0]\na.py"));
        assert!(formatted.contains("[action] cat a.py"));
        assert!(formatted.contains("[returncode: 1]\nboom"));
    }

    #[test]
    fn user_message_has_all_sections() {
        let message = user_message("ctx", "", "", "", None, &[]);
        assert!(message.contains("# Code context\nctx"));
        assert!(message.contains("# Rejected operations\n(none)"));
        assert!(message.contains("# Version control\n(clean working tree)"));
        assert!(message.contains("# Operation history\n(no operations yet)"));
        assert!(!message.contains("# Incoming operation"));
    }

    #[test]
    fn system_message_includes_reflection_only_when_pending() {
        assert!(!system_message("t", false, &[]).contains("# Reflection"));
        assert!(system_message("t", true, &[]).contains("# Reflection"));
    }
}

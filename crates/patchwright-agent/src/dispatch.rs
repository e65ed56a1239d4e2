//! Built-in tool dispatch
//!
//! Two commands are handled by the agent itself instead of the sandbox:
//! `get-nearby-code-context <path> <line> [window]` and
//! `get-code-lines <path> <start> <end>`. Arguments are positional,
//! whitespace-separated, and parsed by an explicit per-tool dispatcher.

use patchwright_context::CodeChunk;

pub const NEARBY_CODE_CONTEXT: &str = "get-nearby-code-context";
pub const CODE_LINES: &str = "get-code-lines";

pub const DEFAULT_WINDOW_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuiltinCall {
    NearbyCodeContext {
        file_path: String,
        line_number: usize,
        window_size: usize,
    },
    CodeLines {
        file_path: String,
        start: usize,
        end: usize,
    },
}

/// Match a command against the built-in tools.
///
/// `None` means the command is not a built-in and goes to the sandbox;
/// `Some(Err(usage))` means the tool name matched but the arguments did not.
pub fn parse_builtin(command: &str) -> Option<Result<BuiltinCall, String>> {
    let stripped = command.trim();
    if let Some(rest) = stripped.strip_prefix(NEARBY_CODE_CONTEXT) {
        return Some(parse_nearby(rest));
    }
    if let Some(rest) = stripped.strip_prefix(CODE_LINES) {
        return Some(parse_lines(rest));
    }
    None
}

fn parse_nearby(rest: &str) -> Result<BuiltinCall, String> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let usage = format!("usage: {NEARBY_CODE_CONTEXT} <file_path> <line_number> [window_size]");
    let [file_path, line_number, ..] = parts.as_slice() else {
        return Err(usage);
    };
    let line_number: usize = line_number.parse().map_err(|_| usage.clone())?;
    let window_size = match parts.get(2) {
        Some(raw) => raw.parse().map_err(|_| usage)?,
        None => DEFAULT_WINDOW_SIZE,
    };
    Ok(BuiltinCall::NearbyCodeContext {
        file_path: file_path.to_string(),
        line_number,
        window_size,
    })
}

fn parse_lines(rest: &str) -> Result<BuiltinCall, String> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let usage = format!("usage: {CODE_LINES} <file_path> <start> <end>");
    let [file_path, start, end] = parts.as_slice() else {
        return Err(usage);
    };
    let start: usize = start.parse().map_err(|_| usage.clone())?;
    let end: usize = end.parse().map_err(|_| usage)?;
    Ok(BuiltinCall::CodeLines {
        file_path: file_path.to_string(),
        start,
        end,
    })
}

/// Human-readable confirmation shown to the model after a chunk loads.
pub fn chunk_summary(chunk: &CodeChunk) -> String {
    if chunk.whole_function {
        return format!(
            "Function {} in file {} is added into the code context.",
            chunk.function, chunk.file_path
        );
    }
    match (chunk.lines.first(), chunk.lines.last()) {
        (Some(first), Some(last)) => format!(
            "Lines {} to {} of file {} are added into the code context.",
            first, last, chunk.file_path
        ),
        _ => format!("No lines found for {}", chunk.file_path),
    }
}

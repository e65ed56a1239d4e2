//! Tool response protocol
//!
//! Sandbox-installed tools report structured results by embedding
//! `<tool-response>{json}</tool-response>` blocks in their stdout. The agent
//! scans command output for these blocks and uses them to update tool status
//! and pull code context into the prompt.

use serde::{Deserialize, Serialize};

const START_TAG: &str = "<tool-response>";
const END_TAG: &str = "</tool-response>";

/// A file location a tool wants loaded into the code context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeContextRef {
    pub file_path: Option<String>,
    pub line_number: Option<i64>,
}

/// One structured tool response parsed from command output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolResponse {
    pub package_name: Option<String>,
    pub output: Option<String>,
    pub returncode: Option<i32>,
    pub code_context: Option<Vec<CodeContextRef>>,
    pub status: Option<serde_json::Value>,
}

impl ToolResponse {
    /// Extract every tool response from raw command output.
    ///
    /// When no tag pair is present the whole string is attempted as a single
    /// JSON record. Records that fail to parse are skipped.
    pub fn parse_all(raw: &str) -> Vec<ToolResponse> {
        let mut payloads: Vec<&str> = Vec::new();
        let mut search_start = 0;
        while let Some(start) = raw[search_start..].find(START_TAG) {
            let body_start = search_start + start + START_TAG.len();
            let Some(end) = raw[body_start..].find(END_TAG) else {
                break;
            };
            payloads.push(raw[body_start..body_start + end].trim());
            search_start = body_start + end + END_TAG.len();
        }
        if payloads.is_empty() {
            payloads.push(raw);
        }
        payloads
            .into_iter()
            .filter_map(|payload| serde_json::from_str::<ToolResponse>(payload).ok())
            .collect()
    }

    /// Serialize back into the wire form, for tools emitting responses.
    pub fn to_wire(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("{START_TAG}{json}{END_TAG}")
    }
}

//! Rendered-region descriptor

use serde::{Deserialize, Serialize};

/// An immutable description of a region of a file that has been pulled into
/// the code context. Line numbers are 1-based and kept sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub file_path: String,
    /// Enclosing class name, empty when the region is not inside a class.
    pub class_name: String,
    /// Enclosing function name, empty outside any function.
    pub function: String,
    /// True when the chunk covers the function end to end.
    pub whole_function: bool,
    pub lines: Vec<usize>,
    /// True when the requested range ran past the end of the file.
    pub eof: bool,
}

impl CodeChunk {
    /// An empty chunk for a path; produced for unreadable or empty files.
    pub fn empty(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    /// Identity used to deduplicate chunks attached to a tree node.
    pub fn key(&self) -> (String, String, String, bool, Vec<usize>) {
        (
            self.file_path.clone(),
            self.class_name.clone(),
            self.function.clone(),
            self.whole_function,
            self.lines.clone(),
        )
    }
}

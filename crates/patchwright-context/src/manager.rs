//! Code context manager: window extraction and deterministic rendering

use crate::chunk::CodeChunk;
use crate::ts;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tree_sitter::{Node, Tree};

const STATEMENT_BLOCKS: [&str; 6] = [
    "if_statement",
    "for_statement",
    "while_statement",
    "with_statement",
    "try_statement",
    "match_statement",
];

const CLAUSE_BLOCKS: [&str; 5] = [
    "elif_clause",
    "else_clause",
    "except_clause",
    "finally_clause",
    "case_clause",
];

/// Delegate that reads files out of the execution environment.
#[async_trait::async_trait]
pub trait FileSource: Send + Sync {
    /// Returns `""` for unreadable files.
    async fn get_file(&self, path: &str) -> String;
}

struct FileEntry {
    content: String,
    tree: Option<Tree>,
}

impl FileEntry {
    fn ensure_tree(&mut self) -> Option<&Tree> {
        if self.tree.is_none() && !self.content.is_empty() {
            self.tree = ts::parse(&self.content);
        }
        self.tree.as_ref()
    }
}

pub struct CodeContextManager {
    source: Arc<dyn FileSource>,
    cwd: String,
    cache: Mutex<HashMap<String, FileEntry>>,
}

impl CodeContextManager {
    pub fn new(source: Arc<dyn FileSource>, cwd: impl Into<String>) -> Self {
        Self {
            source,
            cwd: cwd.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_path(&self, file_path: &str) -> String {
        if !self.cwd.is_empty() && !file_path.starts_with('/') {
            format!("{}/{}", self.cwd, file_path)
        } else {
            file_path.to_string()
        }
    }

    /// Load code surrounding `line_number` into a chunk.
    ///
    /// Outside any function this is a symmetric `window_size`-line window.
    /// Inside a function the whole function is taken when it fits the
    /// window, otherwise a symmetric window clamped to the function extent.
    pub async fn get_nearby_code_context(
        &self,
        file_path: &str,
        line_number: usize,
        window_size: usize,
    ) -> CodeChunk {
        let read_path = self.resolve_path(file_path);
        let mut cache = self.cache.lock().await;
        let entry = fetch_entry(&self.source, &mut cache, &read_path).await;
        if entry.content.is_empty() {
            return CodeChunk::empty(file_path);
        }
        let total_lines = entry.content.lines().count();
        let content = entry.content.clone();
        let Some(tree) = entry.ensure_tree() else {
            return CodeChunk::empty(file_path);
        };
        let root = tree.root_node();

        let func_node = ts::enclosing_node(root, line_number, "function_definition");
        let class_node = ts::enclosing_node(root, line_number, "class_definition");
        let class_name = class_node
            .map(|node| ts::node_name(node, &content))
            .unwrap_or_default();
        let func_name = func_node
            .map(|node| ts::node_name(node, &content))
            .unwrap_or_default();

        let half = window_size / 2;
        let (whole_function, lines) = match func_node {
            None => (
                false,
                window_lines(line_number, half, 1, total_lines),
            ),
            Some(node) => {
                let (func_start, func_end) = ts::node_lines(node);
                if func_end - func_start + 1 <= window_size {
                    (true, ts::line_range(func_start, func_end))
                } else {
                    (false, window_lines(line_number, half, func_start, func_end))
                }
            }
        };

        CodeChunk {
            file_path: file_path.to_string(),
            class_name,
            function: func_name,
            whole_function,
            lines,
            eof: false,
        }
    }

    /// Load an explicit line range into a chunk, clamped to the file.
    pub async fn get_code_lines(&self, file_path: &str, start: usize, end: usize) -> CodeChunk {
        let read_path = self.resolve_path(file_path);
        let mut cache = self.cache.lock().await;
        let entry = fetch_entry(&self.source, &mut cache, &read_path).await;
        if entry.content.is_empty() {
            return CodeChunk::empty(file_path);
        }
        let total = entry.content.lines().count();
        let eof = end > total;
        CodeChunk {
            file_path: file_path.to_string(),
            class_name: String::new(),
            function: String::new(),
            whole_function: false,
            lines: ts::line_range(start.max(1), end.min(total)),
            eof,
        }
    }

    /// A chunk covering a whole file, or `None` when the file is empty.
    pub async fn whole_file_chunk(&self, file_path: &str) -> Option<CodeChunk> {
        let read_path = self.resolve_path(file_path);
        let mut cache = self.cache.lock().await;
        let entry = fetch_entry(&self.source, &mut cache, &read_path).await;
        let line_count = entry.content.lines().count();
        if line_count < 1 {
            return None;
        }
        Some(CodeChunk {
            file_path: file_path.to_string(),
            class_name: String::new(),
            function: String::new(),
            whole_function: false,
            lines: (1..=line_count).collect(),
            eof: false,
        })
    }

    /// Render a chunk set into one excerpt per file.
    ///
    /// Chunks merge by `(file, class, function)`; each extracted line drags
    /// in its enclosing signature and block-declaration lines. Output is a
    /// pure function of the merged set: files sort by path, lines ascend,
    /// gaps collapse to a `...` marker.
    pub async fn render(&self, chunks: &[CodeChunk]) -> String {
        let merged = merge_chunks(chunks);
        if merged.is_empty() {
            return String::new();
        }

        let mut by_file: BTreeMap<String, Vec<CodeChunk>> = BTreeMap::new();
        for chunk in merged {
            by_file.entry(chunk.file_path.clone()).or_default().push(chunk);
        }

        let mut sections = Vec::new();
        let mut cache = self.cache.lock().await;
        for (file_path, file_chunks) in by_file {
            let full_path = self.resolve_path(&file_path);
            let entry = fetch_entry(&self.source, &mut cache, &full_path).await;
            if entry.content.is_empty() {
                continue;
            }
            let content = entry.content.clone();
            let Some(tree) = entry.ensure_tree() else {
                continue;
            };
            let needed = collect_needed_lines(&file_chunks, tree.root_node(), &content);
            if needed.is_empty() {
                continue;
            }
            let eof = file_chunks.iter().any(|c| c.eof);
            let file_lines: Vec<&str> = content.lines().collect();
            let rendered = render_lines(&file_lines, &needed, eof);
            sections.push(format!("## File: `{file_path}`\n{rendered}"));
        }
        sections.join("\n\n")
    }
}

async fn fetch_entry<'c>(
    source: &Arc<dyn FileSource>,
    cache: &'c mut HashMap<String, FileEntry>,
    path: &str,
) -> &'c mut FileEntry {
    if !cache.contains_key(path) {
        let content = source.get_file(path).await;
        cache.insert(path.to_string(), FileEntry { content, tree: None });
    }
    cache.get_mut(path).expect("entry just inserted")
}

fn window_lines(line: usize, half: usize, lo: usize, hi: usize) -> Vec<usize> {
    let start = line.saturating_sub(half).max(lo);
    let end = (line + half).min(hi);
    ts::line_range(start, end)
}

fn merge_chunks(chunks: &[CodeChunk]) -> Vec<CodeChunk> {
    let mut by_key: BTreeMap<(String, String, String), CodeChunk> = BTreeMap::new();
    for chunk in chunks {
        let key = (
            chunk.file_path.clone(),
            chunk.class_name.clone(),
            chunk.function.clone(),
        );
        match by_key.get_mut(&key) {
            None => {
                let mut lines: Vec<usize> = chunk.lines.clone();
                lines.sort_unstable();
                lines.dedup();
                by_key.insert(
                    key,
                    CodeChunk {
                        lines,
                        ..chunk.clone()
                    },
                );
            }
            Some(existing) => {
                existing.whole_function |= chunk.whole_function;
                existing.eof |= chunk.eof;
                existing.lines.extend(chunk.lines.iter().copied());
                existing.lines.sort_unstable();
                existing.lines.dedup();
            }
        }
    }
    by_key.into_values().collect()
}

fn collect_needed_lines(chunks: &[CodeChunk], root: Node, source: &str) -> BTreeSet<usize> {
    let mut signatures: HashMap<(String, String), Vec<usize>> = HashMap::new();
    let mut ranges: HashMap<(String, String), BTreeSet<usize>> = HashMap::new();
    build_signature_maps(root, source, "", None, &mut signatures, &mut ranges);
    let mut block_map: HashMap<usize, BTreeSet<usize>> = HashMap::new();
    build_block_parents(root, &BTreeSet::new(), &mut block_map);

    let mut needed = BTreeSet::new();
    for chunk in chunks {
        needed.extend(signature_lines(&signatures, &chunk.class_name, &chunk.function));
        if chunk.whole_function {
            if let Some(range) = ranges.get(&(chunk.class_name.clone(), chunk.function.clone())) {
                needed.extend(range.iter().copied());
            }
            continue;
        }
        needed.extend(chunk.lines.iter().copied());
        for &line in &chunk.lines {
            if let Some(decls) = block_map.get(&line) {
                needed.extend(decls.iter().copied());
            }
        }
    }
    needed
}

/// Header lines of a definition: first decorator (when inherited) through
/// the line before the body.
fn header_lines(node: Node, decorator_start: Option<usize>) -> Vec<usize> {
    let body = ts::find_first_child(node, "block");
    let mut start = node.start_position().row + 1;
    if let Some(deco) = decorator_start {
        start = start.min(deco);
    }
    let end = body
        .map(|b| b.start_position().row)
        .unwrap_or(node.end_position().row + 1);
    ts::line_range(start, end.max(start))
}

fn build_signature_maps(
    node: Node,
    source: &str,
    class_name: &str,
    decorator_start: Option<usize>,
    signatures: &mut HashMap<(String, String), Vec<usize>>,
    ranges: &mut HashMap<(String, String), BTreeSet<usize>>,
) {
    match node.kind() {
        "decorated_definition" => {
            let decorators = ts::find_children(node, "decorator");
            let inherited = decorators
                .iter()
                .map(|deco| deco.start_position().row + 1)
                .min()
                .or(decorator_start);
            for child in ts::children(node) {
                if child.kind() != "decorator" {
                    build_signature_maps(child, source, class_name, inherited, signatures, ranges);
                }
            }
        }
        "class_definition" => {
            let class_text = node
                .child_by_field_name("name")
                .map(|name| ts::text(name, source))
                .unwrap_or_default();
            let header = header_lines(node, decorator_start);
            signatures.insert((String::new(), class_text.clone()), header.clone());
            signatures.insert((class_text.clone(), String::new()), header);
            if let Some(body) = ts::find_first_child(node, "block") {
                for child in ts::children(body) {
                    build_signature_maps(child, source, &class_text, None, signatures, ranges);
                }
            }
        }
        "function_definition" => {
            let func_text = node
                .child_by_field_name("name")
                .map(|name| ts::text(name, source))
                .unwrap_or_default();
            let key = (class_name.to_string(), func_text);
            signatures.insert(key.clone(), header_lines(node, decorator_start));
            let (start, end) = ts::node_lines(node);
            ranges.insert(key, (start..=end).collect());
        }
        _ => {
            for child in ts::children(node) {
                build_signature_maps(child, source, class_name, None, signatures, ranges);
            }
        }
    }
}

fn signature_lines(
    signatures: &HashMap<(String, String), Vec<usize>>,
    class_name: &str,
    function: &str,
) -> Vec<usize> {
    let mut lines = Vec::new();
    if !class_name.is_empty() {
        if let Some(sig) = signatures.get(&(class_name.to_string(), String::new())) {
            lines.extend(sig.iter().copied());
        }
    }
    if !function.is_empty() {
        if let Some(sig) = signatures.get(&(class_name.to_string(), function.to_string())) {
            lines.extend(sig.iter().copied());
        }
    } else if !class_name.is_empty() {
        if let Some(sig) = signatures.get(&(String::new(), class_name.to_string())) {
            lines.extend(sig.iter().copied());
        }
    }
    lines
}

/// Declaration lines of a compound statement and all of its clause
/// introducers (`elif`/`else`/`except`/`finally`/`case`).
fn collect_declarations(node: Node) -> Vec<usize> {
    let mut decls = Vec::new();
    let kind = node.kind();
    if STATEMENT_BLOCKS.contains(&kind) || CLAUSE_BLOCKS.contains(&kind) {
        decls.push(node.start_position().row + 1);
    }
    for child in ts::children(node) {
        if CLAUSE_BLOCKS.contains(&child.kind()) {
            decls.extend(collect_declarations(child));
        } else if child.kind() == "block" {
            for grandchild in ts::children(child) {
                if CLAUSE_BLOCKS.contains(&grandchild.kind()) {
                    decls.extend(collect_declarations(grandchild));
                }
            }
        }
    }
    decls
}

fn build_block_parents(
    node: Node,
    enclosing: &BTreeSet<usize>,
    parents: &mut HashMap<usize, BTreeSet<usize>>,
) {
    let mut local = enclosing.clone();
    if STATEMENT_BLOCKS.contains(&node.kind()) {
        local.extend(collect_declarations(node));
        let (start, end) = ts::node_lines(node);
        for line in start..=end {
            parents.entry(line).or_default().extend(local.iter().copied());
        }
    }
    for child in ts::children(node) {
        build_block_parents(child, &local, parents);
    }
}

fn render_lines(file_lines: &[&str], line_numbers: &BTreeSet<usize>, eof: bool) -> String {
    let Some(&max_line) = line_numbers.iter().next_back() else {
        return String::new();
    };
    let width = max_line.to_string().len() + 1;
    let mut parts = Vec::new();
    let mut prev_line: Option<usize> = None;
    for &line_number in line_numbers {
        if line_number < 1 || line_number > file_lines.len() {
            continue;
        }
        if let Some(prev) = prev_line {
            if line_number > prev + 1 {
                parts.push("...".to_string());
            }
        }
        parts.push(format!(
            "{:>width$} {}",
            line_number,
            file_lines[line_number - 1],
            width = width
        ));
        prev_line = Some(line_number);
    }
    if eof {
        parts.push("  [EOF]".to_string());
    }
    parts.join("\n")
}

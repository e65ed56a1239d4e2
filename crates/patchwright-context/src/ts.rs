//! Thin helpers over the tree-sitter Python grammar

use tree_sitter::{Node, Parser, Tree};

pub fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(tree_sitter_python::language()).ok()?;
    parser.parse(source, None)
}

/// Innermost node of `kind` whose line span contains `line` (1-based).
pub fn enclosing_node<'t>(root: Node<'t>, line: usize, kind: &str) -> Option<Node<'t>> {
    let idx = line.saturating_sub(1);
    let mut result = None;
    walk_enclosing(root, idx, kind, &mut result);
    result
}

fn walk_enclosing<'t>(node: Node<'t>, idx: usize, kind: &str, result: &mut Option<Node<'t>>) {
    if node.start_position().row <= idx && idx <= node.end_position().row {
        if node.kind() == kind {
            *result = Some(node);
        }
        for child in children(node) {
            walk_enclosing(child, idx, kind, result);
        }
    }
}

/// Name of a definition node: its first `identifier` child.
pub fn node_name(node: Node, source: &str) -> String {
    find_first_child(node, "identifier")
        .map(|child| text(child, source))
        .unwrap_or_default()
}

/// 1-based inclusive line span.
pub fn node_lines(node: Node) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}

pub fn text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or_default().to_string()
}

pub fn children<'t>(node: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    (0..node.child_count()).filter_map(move |i| node.child(i))
}

pub fn find_children<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    children(node).filter(|child| child.kind() == kind).collect()
}

pub fn find_first_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    children(node).find(|child| child.kind() == kind)
}

/// Inclusive 1-based line range; empty when `start > end`.
pub fn line_range(start: usize, end: usize) -> Vec<usize> {
    if start <= end {
        (start..=end).collect()
    } else {
        Vec::new()
    }
}

//! Operation history tree
//!
//! Every accepted and rejected decision lives in one arena owned by the
//! tree; parents and children are indices, so back-references cannot form
//! ownership cycles. A synthetic root sentinel anchors the tree so "no
//! decisions yet" and "at the top" look the same to callers.

use crate::error::AgentError;
use patchwright_core::{ActionObservation, ActionProperty};
use patchwright_context::CodeChunk;
use std::collections::BTreeMap;

/// Index into the tree's node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One decision made by the model.
#[derive(Clone, Debug, Default)]
pub struct OperationNode {
    pub thoughts: String,
    pub action: String,
    pub property: Option<ActionProperty>,
    pub observations: Vec<ActionObservation>,
    pub summary: String,
    pub valid: Option<bool>,
    pub lessons: String,
    /// Summaries of dead paths that were abandoned at this node. Only
    /// meaningful for exploratory nodes that served as backtrack targets.
    pub dead_path_summaries: Vec<String>,
    pub code_chunks: Vec<CodeChunk>,
    pub tool_status: BTreeMap<String, serde_json::Value>,
    /// Working-tree diff captured after this action executed.
    pub code_change: String,
    pub dead_path: bool,
    pub invalid_ops: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

pub struct OperationTree {
    nodes: Vec<OperationNode>,
    current: NodeId,
    temp: Option<NodeId>,
    max_invalid: usize,
}

impl OperationTree {
    pub fn new(max_invalid: usize) -> Self {
        Self {
            nodes: vec![OperationNode::default()],
            current: NodeId(0),
            temp: None,
            max_invalid,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn node(&self, id: NodeId) -> &OperationNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut OperationNode {
        &mut self.nodes[id.0]
    }

    pub fn has_pending(&self) -> bool {
        self.temp.is_some()
    }

    pub fn pending(&self) -> Option<NodeId> {
        self.temp
    }

    /// Whether `current` points at a real decision rather than the sentinel.
    pub fn has_real_current(&self) -> bool {
        self.current != self.root()
    }

    /// The node new artifacts (chunks, tool status) attach to: the pending
    /// temp node when one exists, otherwise the current node.
    pub fn active_node(&self) -> Option<NodeId> {
        self.temp.or_else(|| self.has_real_current().then_some(self.current))
    }

    /// Start a new decision awaiting reflection.
    pub fn create_temp_node(
        &mut self,
        thoughts: impl Into<String>,
        action: impl Into<String>,
        property: Option<ActionProperty>,
    ) -> Result<NodeId, AgentError> {
        if self.temp.is_some() {
            return Err(AgentError::PendingExists);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(OperationNode {
            thoughts: thoughts.into(),
            action: action.into(),
            property,
            ..Default::default()
        });
        self.temp = Some(id);
        Ok(id)
    }

    /// No-op when no temp node exists.
    pub fn set_observation(&mut self, observations: Vec<ActionObservation>) {
        if let Some(id) = self.temp {
            self.nodes[id.0].observations = observations;
        }
    }

    /// No-op when no temp node exists.
    pub fn set_reflection(&mut self, valid: bool, lessons: impl Into<String>, summary: impl Into<String>) {
        if let Some(id) = self.temp {
            let node = &mut self.nodes[id.0];
            node.valid = Some(valid);
            node.lessons = lessons.into();
            node.summary = summary.into();
        }
    }

    /// Link the temp node as a child of `current` and advance to it.
    pub fn commit_admissible(&mut self) {
        let Some(id) = self.temp.take() else {
            return;
        };
        self.nodes[id.0].parent = Some(self.current);
        let current = self.current;
        self.nodes[current.0].children.push(id);
        self.current = id;
    }

    /// Record the temp node as a rejected attempt under `current`.
    /// Returns true when the rejection count reaches the dead-end bound.
    pub fn commit_invalid(&mut self) -> bool {
        let Some(id) = self.temp.take() else {
            return false;
        };
        self.nodes[id.0].parent = Some(self.current);
        let current = self.current;
        self.nodes[current.0].invalid_ops.push(id);
        self.nodes[current.0].invalid_ops.len() >= self.max_invalid
    }

    /// Closest exploratory ancestor of `current`, the only legal place to
    /// back out to.
    pub fn find_backtrack_target(&self) -> Option<NodeId> {
        let mut node = self.nodes[self.current.0].parent;
        while let Some(id) = node {
            if id == self.root() {
                break;
            }
            if self.nodes[id.0].property == Some(ActionProperty::Exploratory) {
                return Some(id);
            }
            node = self.nodes[id.0].parent;
        }
        None
    }

    /// Abandon the branch from `target` down to `current`: flag target's
    /// child on that branch, record the summary, and return to `target`.
    pub fn backtrack_to(&mut self, target: NodeId, dead_path_summary: impl Into<String>) {
        let mut node = Some(self.current);
        while let Some(id) = node {
            if self.nodes[id.0].parent == Some(target) {
                break;
            }
            node = self.nodes[id.0].parent;
        }
        if let Some(id) = node {
            self.nodes[id.0].dead_path = true;
        }
        self.nodes[target.0]
            .dead_path_summaries
            .push(dead_path_summary.into());
        self.current = target;
    }

    /// Path from the first decision to `target` inclusive, sentinel excluded.
    pub fn path_to(&self, target: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut node = Some(target);
        while let Some(id) = node {
            if id == self.root() {
                break;
            }
            path.push(id);
            node = self.nodes[id.0].parent;
        }
        path.reverse();
        path
    }

    pub fn path_from_root_to_current(&self) -> Vec<NodeId> {
        if !self.has_real_current() {
            return Vec::new();
        }
        self.path_to(self.current)
    }

    /// The currently believed productive spine: descend from the first live
    /// child of the sentinel, preferring a live child that itself has
    /// children, else the last live child. `current` is appended when the
    /// walk did not reach it.
    pub fn reasoning_chain(&self) -> Vec<NodeId> {
        let live_roots: Vec<NodeId> = self.nodes[0]
            .children
            .iter()
            .copied()
            .filter(|&c| !self.nodes[c.0].dead_path)
            .collect();
        let Some(&first) = live_roots.first() else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        let mut node = first;
        loop {
            chain.push(node);
            let live_children: Vec<NodeId> = self.nodes[node.0]
                .children
                .iter()
                .copied()
                .filter(|&c| !self.nodes[c.0].dead_path)
                .collect();
            let with_children = live_children
                .iter()
                .copied()
                .find(|&c| !self.nodes[c.0].children.is_empty());
            if let Some(next) = with_children {
                node = next;
            } else if let Some(&last) = live_children.last() {
                node = last;
            } else {
                break;
            }
        }
        if self.has_real_current() && !chain.contains(&self.current) {
            chain.push(self.current);
        }
        chain
    }

    /// Every rejected attempt along the path from the root to `current`.
    pub fn rejected_actions(&self) -> Vec<NodeId> {
        let mut rejected = Vec::new();
        rejected.extend(self.nodes[0].invalid_ops.iter().copied());
        for id in self.path_from_root_to_current() {
            rejected.extend(self.nodes[id.0].invalid_ops.iter().copied());
        }
        rejected
    }
}

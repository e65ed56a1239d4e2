//! Tests for the operation history tree

use patchwright_agent::{AgentError, NodeId, OperationTree};
use patchwright_core::{ActionObservation, ActionProperty};

fn commit_admissible(tree: &mut OperationTree, thoughts: &str, prop: Option<ActionProperty>) -> NodeId {
    let id = tree.create_temp_node(thoughts, "a", prop).unwrap();
    tree.commit_admissible();
    id
}

// ===========================================================================
// Initial state
// ===========================================================================

#[test]
fn initial_state_points_at_sentinel() {
    let tree = OperationTree::new(3);
    assert_eq!(tree.root(), tree.current());
    assert!(!tree.has_pending());
    assert!(!tree.has_real_current());
    assert!(tree.active_node().is_none());
    assert!(tree.path_from_root_to_current().is_empty());
}

// ===========================================================================
// create_temp_node
// ===========================================================================

#[test]
fn create_temp_node_sets_fields() {
    let mut tree = OperationTree::new(3);
    let id = tree
        .create_temp_node("t", "a", Some(ActionProperty::Exploitative))
        .unwrap();
    assert!(tree.has_pending());
    assert_eq!(tree.active_node(), Some(id));
    let node = tree.node(id);
    assert_eq!(node.thoughts, "t");
    assert_eq!(node.action, "a");
    assert_eq!(node.property, Some(ActionProperty::Exploitative));
    assert!(node.valid.is_none());
}

#[test]
fn double_create_is_a_pending_error() {
    let mut tree = OperationTree::new(3);
    tree.create_temp_node("t", "a", None).unwrap();
    assert!(matches!(
        tree.create_temp_node("t2", "b", None),
        Err(AgentError::PendingExists)
    ));
}

// ===========================================================================
// set_observation / set_reflection
// ===========================================================================

#[test]
fn observation_and_reflection_land_on_temp_node() {
    let mut tree = OperationTree::new(3);
    let id = tree.create_temp_node("t", "a", None).unwrap();
    tree.set_observation(vec![ActionObservation::new("cmd", 0, "obs")]);
    tree.set_reflection(true, "lesson1", "short summary");
    let node = tree.node(id);
    assert_eq!(node.observations.len(), 1);
    assert_eq!(node.valid, Some(true));
    assert_eq!(node.lessons, "lesson1");
    assert_eq!(node.summary, "short summary");
}

#[test]
fn setters_are_noops_without_temp_node() {
    let mut tree = OperationTree::new(3);
    tree.set_observation(vec![ActionObservation::new("cmd", 0, "obs")]);
    tree.set_reflection(false, "x", "");
    assert!(!tree.has_pending());
    // Sentinel untouched
    assert!(tree.node(tree.root()).observations.is_empty());
}

// ===========================================================================
// commit_admissible
// ===========================================================================

#[test]
fn first_commit_becomes_child_of_root() {
    let mut tree = OperationTree::new(3);
    let id = commit_admissible(&mut tree, "t", None);
    assert_eq!(tree.node(id).parent, Some(tree.root()));
    assert_eq!(tree.current(), id);
    assert!(!tree.has_pending());
}

#[test]
fn linear_commits_chain_parent_links() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", None);
    let b = commit_admissible(&mut tree, "b", None);
    let c = commit_admissible(&mut tree, "c", None);
    assert_eq!(tree.node(a).parent, Some(tree.root()));
    assert_eq!(tree.node(b).parent, Some(a));
    assert_eq!(tree.node(c).parent, Some(b));
    assert_eq!(tree.node(a).children, vec![b]);
    assert_eq!(tree.node(b).children, vec![c]);
    assert_eq!(tree.current(), c);
    // A linear history: path, chain, and rejected set all line up.
    assert_eq!(tree.path_from_root_to_current(), vec![a, b, c]);
    assert_eq!(tree.reasoning_chain(), vec![a, b, c]);
    assert!(tree.rejected_actions().is_empty());
}

#[test]
fn commit_admissible_noop_without_temp() {
    let mut tree = OperationTree::new(3);
    tree.commit_admissible();
    assert!(tree.node(tree.root()).children.is_empty());
}

// ===========================================================================
// commit_invalid
// ===========================================================================

#[test]
fn commit_invalid_under_threshold() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "a", None);
    tree.create_temp_node("np1", "a", None).unwrap();
    assert!(!tree.commit_invalid());
    assert_eq!(tree.node(tree.current()).invalid_ops.len(), 1);
    assert!(!tree.has_pending());
}

#[test]
fn commit_invalid_overflow_at_bound() {
    // With max_invalid = 2 the second rejection reports overflow.
    let mut tree = OperationTree::new(2);
    let a = commit_admissible(&mut tree, "a", None);
    tree.create_temp_node("np1", "x", None).unwrap();
    assert!(!tree.commit_invalid());
    tree.create_temp_node("np2", "y", None).unwrap();
    assert!(tree.commit_invalid());
    assert_eq!(tree.node(a).invalid_ops.len(), 2);
    assert_eq!(tree.current(), a);
}

#[test]
fn commit_invalid_links_parent() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", None);
    tree.create_temp_node("np", "x", None).unwrap();
    tree.commit_invalid();
    let rejected = tree.node(a).invalid_ops[0];
    assert_eq!(tree.node(rejected).parent, Some(a));
    // Rejected attempts never appear among accepted children.
    assert!(tree.node(a).children.is_empty());
}

#[test]
fn commit_invalid_attaches_to_sentinel_before_first_commit() {
    let mut tree = OperationTree::new(3);
    tree.create_temp_node("np", "x", None).unwrap();
    assert!(!tree.commit_invalid());
    assert_eq!(tree.node(tree.root()).invalid_ops.len(), 1);
}

#[test]
fn commit_invalid_noop_without_temp() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "a", None);
    assert!(!tree.commit_invalid());
}

// ===========================================================================
// find_backtrack_target
// ===========================================================================

#[test]
fn no_backtrack_target_in_empty_tree() {
    assert!(OperationTree::new(3).find_backtrack_target().is_none());
}

#[test]
fn backtrack_target_is_closest_exploratory_ancestor() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    commit_admissible(&mut tree, "b", Some(ActionProperty::Exploitative));
    commit_admissible(&mut tree, "c", Some(ActionProperty::Exploitative));
    assert_eq!(tree.find_backtrack_target(), Some(a));
}

#[test]
fn no_backtrack_target_when_all_exploitative() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "a", Some(ActionProperty::Exploitative));
    commit_admissible(&mut tree, "b", Some(ActionProperty::Exploitative));
    assert!(tree.find_backtrack_target().is_none());
}

#[test]
fn backtrack_target_skips_to_nearest() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    let b = commit_admissible(&mut tree, "b", Some(ActionProperty::Exploratory));
    commit_admissible(&mut tree, "c", Some(ActionProperty::Exploitative));
    assert_eq!(tree.find_backtrack_target(), Some(b));
}

#[test]
fn current_node_is_not_its_own_target() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    // current == a; target search starts at the parent.
    assert!(tree.find_backtrack_target().is_none());
}

// ===========================================================================
// backtrack_to
// ===========================================================================

#[test]
fn backtrack_marks_branch_and_returns_to_target() {
    // A (exploratory) -> B -> C, dead-end at C.
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    let b = commit_admissible(&mut tree, "b", Some(ActionProperty::Exploitative));
    commit_admissible(&mut tree, "c", Some(ActionProperty::Exploitative));
    assert_eq!(tree.find_backtrack_target(), Some(a));

    tree.backtrack_to(a, "dead");
    assert_eq!(tree.current(), a);
    assert!(tree.node(b).dead_path);
    assert_eq!(tree.node(a).dead_path_summaries, vec!["dead".to_string()]);

    let d = commit_admissible(&mut tree, "d", Some(ActionProperty::Exploitative));
    assert_eq!(tree.node(d).parent, Some(a));
    assert_eq!(tree.reasoning_chain(), vec![a, d]);
}

#[test]
fn dead_path_flag_is_not_transitive() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    let b = commit_admissible(&mut tree, "b", None);
    let c = commit_admissible(&mut tree, "c", None);
    tree.backtrack_to(a, "dead");
    // Only the immediate child of the target is flagged.
    assert!(tree.node(b).dead_path);
    assert!(!tree.node(c).dead_path);
}

#[test]
fn multiple_dead_paths_from_same_node() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    let b = commit_admissible(&mut tree, "b", None);
    tree.backtrack_to(a, "dead path 1");
    assert!(tree.node(b).dead_path);

    let c = commit_admissible(&mut tree, "c", None);
    tree.backtrack_to(a, "dead path 2");
    assert!(tree.node(c).dead_path);
    assert_eq!(
        tree.node(a).dead_path_summaries,
        vec!["dead path 1".to_string(), "dead path 2".to_string()]
    );

    let d = commit_admissible(&mut tree, "d", None);
    assert_eq!(tree.reasoning_chain(), vec![a, d]);
}

// ===========================================================================
// paths
// ===========================================================================

#[test]
fn path_to_walks_root_first() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", None);
    let b = commit_admissible(&mut tree, "b", None);
    let c = commit_admissible(&mut tree, "c", None);
    assert_eq!(tree.path_to(c), vec![a, b, c]);
    assert_eq!(tree.path_to(b), vec![a, b]);
}

// ===========================================================================
// reasoning_chain
// ===========================================================================

#[test]
fn reasoning_chain_empty_tree() {
    assert!(OperationTree::new(3).reasoning_chain().is_empty());
}

#[test]
fn reasoning_chain_excludes_dead_branches() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    commit_admissible(&mut tree, "b", None);
    commit_admissible(&mut tree, "c", None);
    tree.backtrack_to(a, "dead");
    let d = commit_admissible(&mut tree, "retry", None);
    assert_eq!(tree.reasoning_chain(), vec![a, d]);
    // Invariant: nothing on the chain is flagged dead.
    for id in tree.reasoning_chain() {
        assert!(!tree.node(id).dead_path);
    }
}

#[test]
fn reasoning_chain_contains_current_after_backtrack() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", None);
    commit_admissible(&mut tree, "b", None);
    tree.backtrack_to(a, "dead");
    // Chain collapses to [a]; current == a is already on it.
    assert_eq!(tree.reasoning_chain(), vec![a]);
}

#[test]
fn reasoning_chain_prefers_live_child_with_children() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    let b = commit_admissible(&mut tree, "b", None);
    let c = commit_admissible(&mut tree, "c", None);
    // Back to a, then a second child without descendants.
    tree.backtrack_to(a, "dead1");
    // b is dead; chain should not follow it even though it has a child.
    let d = commit_admissible(&mut tree, "d", None);
    let chain = tree.reasoning_chain();
    assert_eq!(chain, vec![a, d]);
    assert!(!chain.contains(&b));
    assert!(!chain.contains(&c));
}

// ===========================================================================
// rejected_actions
// ===========================================================================

#[test]
fn rejected_actions_collects_along_active_path() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "t1", None);
    tree.create_temp_node("np", "bad-action", None).unwrap();
    tree.commit_invalid();
    commit_admissible(&mut tree, "t2", None);
    let rejected = tree.rejected_actions();
    assert_eq!(rejected.len(), 1);
    assert_eq!(tree.node(rejected[0]).thoughts, "np");
    assert_eq!(tree.node(rejected[0]).action, "bad-action");
}

#[test]
fn rejected_actions_empty_without_invalid_ops() {
    let mut tree = OperationTree::new(3);
    commit_admissible(&mut tree, "a", None);
    commit_admissible(&mut tree, "b", None);
    assert!(tree.rejected_actions().is_empty());
}

#[test]
fn rejected_actions_includes_sentinel_rejections() {
    let mut tree = OperationTree::new(3);
    tree.create_temp_node("np", "x", None).unwrap();
    tree.commit_invalid();
    assert_eq!(tree.rejected_actions().len(), 1);
}

// ===========================================================================
// Full backtrack-and-retry
// ===========================================================================

#[test]
fn full_backtrack_and_retry() {
    let mut tree = OperationTree::new(3);
    let a = commit_admissible(&mut tree, "a", Some(ActionProperty::Exploratory));
    let b = commit_admissible(&mut tree, "b", Some(ActionProperty::Exploitative));
    commit_admissible(&mut tree, "c", Some(ActionProperty::Exploitative));

    tree.backtrack_to(a, "path A->B->C was a dead end");
    assert_eq!(tree.current(), a);
    assert!(tree.node(b).dead_path);
    assert_eq!(
        tree.node(a).dead_path_summaries,
        vec!["path A->B->C was a dead end".to_string()]
    );

    let d = commit_admissible(&mut tree, "d", Some(ActionProperty::Exploitative));
    assert_eq!(tree.node(d).parent, Some(a));
    assert_eq!(tree.current(), d);
    assert_eq!(tree.reasoning_chain(), vec![a, d]);
}

//! Tree traversal helpers

use crate::SchemaNode;

/// Find a node by id anywhere in the tree
pub fn find_node<'a>(nodes: &'a [SchemaNode], id: &str) -> Option<&'a SchemaNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Replace the children of the node with the given id, wherever it sits.
/// Siblings and the rest of the tree are untouched. Returns false when no
/// node matches.
pub fn deep_replace_children(
    nodes: &mut [SchemaNode],
    id: &str,
    children: Vec<SchemaNode>,
) -> bool {
    for node in nodes {
        if node.id == id {
            node.children = children;
            return true;
        }
        if deep_replace_children(&mut node.children, id, children.clone()) {
            return true;
        }
    }
    false
}

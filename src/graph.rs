//! Topological traversal of node ancestries.
//!
//! The scheduler needs the ancestors of the requested nodes in
//! parents-before-children order. Construction guarantees acyclicity (a node
//! can only reference nodes that already exist), so this is a plain
//! iterative post-order walk with pointer-identity deduplication.

use crate::node::{NodeRef, node_addr};
use std::collections::HashSet;
use std::sync::Arc;

/// All ancestors of `roots` (the roots included), topologically ordered with
/// every node appearing after all of its parents. Shared sub-expressions
/// appear exactly once.
pub fn topo_order(roots: &[NodeRef]) -> Vec<NodeRef> {
    let mut order: Vec<NodeRef> = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    // (node, index of the next parent to descend into)
    let mut stack: Vec<(NodeRef, usize)> = Vec::new();

    for root in roots {
        if !visited.insert(node_addr(root)) {
            continue;
        }
        stack.push((Arc::clone(root), 0));
        loop {
            let Some((node, next)) = stack.last_mut() else {
                break;
            };
            let idx = *next;
            *next += 1;
            let parent = node.parents().get(idx).cloned();
            match parent {
                Some(parent) => {
                    if visited.insert(node_addr(&parent)) {
                        stack.push((parent, 0));
                    }
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        order.push(done);
                    }
                }
            }
        }
    }
    order
}

// src/taskmaster/cycle.rs

//! End-of-walk cycle diagnosis along `waiting_parents` edges.

use std::collections::{BTreeSet, HashSet};

use crate::node::{NodeGraph, NodeId};

/// Follow `waiting_parents` from `start` until the path returns to it.
///
/// The returned path is in dependency order (each node depends on the next)
/// and ends with `start` again, e.g. `[A, B, C, A]`.
pub fn find_cycle(graph: &NodeGraph, start: NodeId) -> Option<Vec<NodeId>> {
    let mut stack = vec![start];
    let mut visited = HashSet::new();
    if search(graph, &mut stack, &mut visited) {
        // Walked child -> parent; flip into parent -> child order.
        stack.reverse();
        Some(stack)
    } else {
        None
    }
}

fn search(graph: &NodeGraph, stack: &mut Vec<NodeId>, visited: &mut HashSet<NodeId>) -> bool {
    let Some(&top) = stack.last() else {
        return false;
    };
    if !visited.insert(top) {
        return false;
    }
    for parent in graph.node(top).waiting_parents().iter().copied() {
        stack.push(parent);
        if stack.first() == Some(&parent) {
            return true;
        }
        if search(graph, stack, visited) {
            return true;
        }
        stack.pop();
    }
    false
}

/// Drop rotations of a cycle already in `cycles`.
pub(crate) fn dedup_cycles(cycles: Vec<Vec<NodeId>>) -> Vec<Vec<NodeId>> {
    let mut seen: Vec<BTreeSet<NodeId>> = Vec::new();
    let mut out = Vec::new();
    for cycle in cycles {
        let members: BTreeSet<NodeId> = cycle.iter().copied().collect();
        if seen.contains(&members) {
            continue;
        }
        seen.push(members);
        out.push(cycle);
    }
    out
}

//! Cycle detection and breaking.
//!
//! Runs after all relations are built. A depth-first traversal over
//! operation-level relations marks every back-edge as cyclic in place;
//! the relations stay in the graph so diagnostics can still see them,
//! but scheduling and pending-count bookkeeping ignore them. After this
//! pass the subgraph of non-cyclic relations is a DAG.
//!
//! Cycles are expected (accidental self-referencing constraints and the
//! like) and are never fatal: evaluation degrades to best-effort order
//! instead of aborting.

use fixedbitset::FixedBitSet;

use crate::graph::DepsGraph;
use crate::node::OpHandle;

/// Detects cycles among non-cyclic relations and marks back-edges
/// cyclic. Returns the number of relations marked by this pass.
pub fn detect_cycles(graph: &mut DepsGraph) -> usize {
    let n = graph.operation_count();
    let mut finished = FixedBitSet::with_capacity(n);
    let mut on_stack = FixedBitSet::with_capacity(n);
    let mut marked = 0;

    // Iterative DFS; each frame remembers how many outlinks it has
    // already followed.
    let mut stack: Vec<(OpHandle, usize)> = Vec::new();

    for root in graph.operation_handles() {
        if finished.contains(root.index()) {
            continue;
        }
        stack.push((root, 0));
        on_stack.insert(root.index());

        while let Some(&mut (op, ref mut link_idx)) = stack.last_mut() {
            let next = graph.operation(op).outlinks.get(*link_idx).copied();
            *link_idx += 1;

            let Some(rel_handle) = next else {
                // All edges followed, retire the frame.
                on_stack.set(op.index(), false);
                finished.insert(op.index());
                stack.pop();
                continue;
            };

            let rel = graph.relation(rel_handle);
            if rel.cyclic {
                continue;
            }
            let target = rel.to;

            if on_stack.contains(target.index()) {
                // Back-edge: this relation closes a cycle.
                log::warn!(
                    "dependency cycle detected, breaking relation '{}' ({} -> {})",
                    rel.description,
                    graph.operation(rel.from).name,
                    graph.operation(target).name,
                );
                graph.relation_mut(rel_handle).cyclic = true;
                marked += 1;
            } else if !finished.contains(target.index()) {
                stack.push((target, 0));
                on_stack.insert(target.index());
            }
        }
    }

    marked
}

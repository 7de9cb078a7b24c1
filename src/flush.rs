//! Update-tag flushing.
//!
//! Tagging marks only the operations a collaborator touched. Anything
//! downstream of a stale operation is stale too, so before a pass the
//! `needs_update` flags are propagated from all entry-tagged operations
//! along non-cyclic relations. Runs single-threaded in the tag phase.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;

use crate::graph::DepsGraph;
use crate::node::OpHandle;

/// Propagates `needs_update` downstream from every entry-tagged
/// operation. Returns the number of operations newly tagged.
pub(crate) fn flush_updates(graph: &mut DepsGraph) -> usize {
    let mut queue: VecDeque<OpHandle> = graph.entry_tags().collect();
    let mut seen = FixedBitSet::with_capacity(graph.operation_count());
    for op in &queue {
        seen.insert(op.index());
    }

    let mut flushed = 0;
    while let Some(op) = queue.pop_front() {
        let outlinks = graph.operation(op).outlinks.clone();
        for rel_handle in outlinks {
            let rel = graph.relation(rel_handle);
            if rel.cyclic {
                continue;
            }
            let child = rel.to;
            if seen.contains(child.index()) {
                continue;
            }
            seen.insert(child.index());
            let node = graph.operation_mut(child);
            if !node.needs_update {
                node.needs_update = true;
                flushed += 1;
            }
            queue.push_back(child);
        }
    }

    if flushed > 0 {
        log::debug!("flush_updates: {flushed} operations tagged downstream");
    }
    flushed
}

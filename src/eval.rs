//! The evaluation scheduler.
//!
//! Executes all stale operations of a graph in dependency order with
//! maximum safe parallelism. Per pass, every operation moves through
//! `UNSCHEDULED -> READY (pending == 0) -> DISPATCHED -> DONE`; a no-op
//! goes `READY -> DONE` synchronously without occupying a worker.
//!
//! Ordering guarantee: for a non-cyclic relation `A -> B` where both
//! operations are visible and stale, B is never dispatched before A has
//! completed. Siblings with no relation between them run in unspecified
//! relative order.
//!
//! The graph is read-only during execution; the per-operation pending
//! counter and scheduled flag are the only concurrently mutated state.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::entity::EvalMode;
use crate::flush;
use crate::graph::DepsGraph;
use crate::node::{ComponentKind, OpCallback, OpHandle, OperationNode};
use crate::stats;
use crate::worker_pool::{TaskQueue, WorkerPool};

/// Pending-count initialization walks operations in parallel chunks of
/// at least this many.
const INIT_MIN_CHUNK: usize = 1024;

/// Per-pass evaluation options.
#[derive(Debug, Clone, Default)]
pub struct EvalSettings {
    /// Record per-operation wall time and aggregate it after the pass.
    pub collect_stats: bool,
}

/// Context handed to every operation callback.
///
/// Callbacks may read shadow state of entities guaranteed upstream by a
/// relation and write their own entity's shadow state; the context
/// itself is immutable and shared.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// Current evaluation time in seconds.
    pub time: f64,
    /// Evaluation mode of the graph being evaluated.
    pub mode: EvalMode,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    /// Operations dispatched this pass (including no-ops).
    pub scheduled: usize,
    /// Schedulable operations that never reached completion (cycle or
    /// consistency bug); left stale for the next pass.
    pub stuck: usize,
    /// Wall-clock time of the whole pass.
    pub wall_time: std::time::Duration,
}

/// Transient state shared across workers for one pass.
struct EvalState<'a> {
    graph: &'a DepsGraph,
    context: EvalContext,
    collect_stats: bool,
}

/// Evaluates all operations tagged for update.
///
/// Returns immediately when nothing was tagged since the last pass.
/// Flushes tags downstream, initializes pending counts, seeds ready
/// operations, and drives the worker pool until drain. All staleness
/// tags are cleared afterwards; operations that never completed are
/// reported via [`PassSummary::stuck`] and stay stale for the next
/// pass.
pub fn evaluate_on_refresh(
    graph: &mut DepsGraph,
    pool: &WorkerPool,
    settings: &EvalSettings,
) -> PassSummary {
    if !graph.has_entry_tags() {
        return PassSummary::default();
    }
    let start = Instant::now();

    flush::flush_updates(graph);
    initialize_execution(graph, pool, settings.collect_stats);

    {
        let context = EvalContext {
            time: graph.time_source().time,
            mode: graph.viewpoint().mode,
        };
        let state = EvalState {
            graph: &*graph,
            context,
            collect_stats: settings.collect_stats,
        };
        let queue = TaskQueue::new();

        // Seed: every ready operation is a candidate.
        for op in state.graph.operation_handles() {
            schedule_node(&state, &queue, op, false);
        }

        pool.run(&queue, |op: OpHandle| {
            run_operation(&state, op);
            schedule_children(&state, &queue, op);
        });
    }

    let mut scheduled = 0;
    let mut stuck = 0;
    for op in graph.operation_handles() {
        let node = graph.operation(op);
        if node.scheduled.load(Ordering::Relaxed) {
            scheduled += 1;
        } else if node.needs_update && is_operation_visible(graph, node) {
            stuck += 1;
            log::debug!("operation '{}' left stale after drain", node.name);
        }
    }

    if settings.collect_stats {
        stats::aggregate(graph);
    }
    graph.clear_tags();

    PassSummary {
        scheduled,
        stuck,
        wall_time: start.elapsed(),
    }
}

/// Whether an operation participates in scheduling.
///
/// Copy-on-write operations are unconditionally visible: the shadow
/// database must stay consistent even for entities that do not
/// contribute to the output.
fn is_operation_visible(graph: &DepsGraph, node: &OperationNode) -> bool {
    let component = graph.component(node.owner);
    if component.kind == ComponentKind::CopyOnWrite {
        return true;
    }
    graph.id_node(component.owner).is_visible
}

/// Computes `num_links_pending` for every operation and resets the
/// dispatch guards. Parallel and order-independent.
pub(crate) fn initialize_execution(graph: &DepsGraph, pool: &WorkerPool, collect_stats: bool) {
    pool.for_each_index(graph.operation_count(), INIT_MIN_CHUNK, |i| {
        let node = graph.operation(OpHandle(i as u32));
        node.num_links_pending.store(0, Ordering::Relaxed);
        node.scheduled.store(false, Ordering::Relaxed);
        if collect_stats {
            node.stats.reset_current();
        }
        // Invisible operations are never scheduled, so they need no
        // pending-count bookkeeping.
        if !is_operation_visible(graph, node) {
            return;
        }
        if !node.needs_update {
            return;
        }
        let mut pending = 0u32;
        for &rel_handle in &node.inlinks {
            let rel = graph.relation(rel_handle);
            if rel.cyclic {
                continue;
            }
            let from = graph.operation(rel.from);
            if !is_operation_visible(graph, from) {
                continue;
            }
            // An up-to-date prerequisite is already satisfied.
            if !from.needs_update {
                continue;
            }
            pending += 1;
        }
        node.num_links_pending.store(pending, Ordering::Relaxed);
    });
}

/// Schedules an operation if it is ready.
///
/// With `dec_parents` set (a parent just completed), atomically
/// decrements the pending count first; the decrement result decides
/// readiness so concurrent parents cannot both observe zero. Dispatch
/// itself is guarded by a compare-and-swap on the scheduled flag.
fn schedule_node(state: &EvalState<'_>, queue: &TaskQueue<OpHandle>, op: OpHandle, dec_parents: bool) {
    let node = state.graph.operation(op);
    if !is_operation_visible(state.graph, node) {
        return;
    }
    if !node.needs_update {
        return;
    }

    let pending = if dec_parents {
        let prev = node.num_links_pending.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // Miscounted at init time vs. release time: saturate and
            // flag the inconsistency.
            node.num_links_pending.store(0, Ordering::Relaxed);
            debug_assert!(false, "pending-count underflow on '{}'", node.name);
            log::error!("pending-count underflow on '{}'", node.name);
            0
        } else {
            prev - 1
        }
    } else {
        node.num_links_pending.load(Ordering::Acquire)
    };
    if pending != 0 {
        return;
    }

    // At-most-once dispatch: losing the race means another parent (or
    // the seeding loop) already claimed this operation.
    if node
        .scheduled
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    if node.is_noop() {
        // READY -> DONE without occupying a worker.
        schedule_children(state, queue, op);
    } else {
        queue.push(op);
    }
}

/// Invokes the operation callback, timing it when requested.
fn run_operation(state: &EvalState<'_>, op: OpHandle) {
    let node = state.graph.operation(op);
    match &node.callback {
        OpCallback::Regular(callback) => {
            if state.collect_stats {
                let start = Instant::now();
                callback(&state.context);
                node.stats.add_current(start.elapsed());
            } else {
                callback(&state.context);
            }
        }
        OpCallback::NoOp => {
            debug_assert!(false, "no-op '{}' must not reach a worker", node.name);
        }
    }
}

/// Releases the children of a completed operation.
///
/// Cyclic relations are skipped entirely: they never decrement and
/// never block.
fn schedule_children(state: &EvalState<'_>, queue: &TaskQueue<OpHandle>, op: OpHandle) {
    let node = state.graph.operation(op);
    for &rel_handle in &node.outlinks {
        let rel = state.graph.relation(rel_handle);
        if rel.cyclic {
            continue;
        }
        let child = state.graph.operation(rel.to);
        if child.scheduled.load(Ordering::Acquire) {
            // Already dispatched via another path; nothing to release.
            continue;
        }
        schedule_node(state, queue, rel.to, true);
    }
}

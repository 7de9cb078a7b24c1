//! Per-pass timing aggregation.
//!
//! When a pass collects stats, each executed operation accumulates its
//! wall time. After the pass drains, [`aggregate`] rolls those numbers
//! up into the owning component and ID nodes and folds them into the
//! lifetime totals, so profiling views can show per-entity cost.

use std::fmt;
use std::time::Duration;

use crate::graph::DepsGraph;

/// Rolls per-operation timings of the last pass up into component and
/// ID node totals. Runs single-threaded after the pass drains.
pub(crate) fn aggregate(graph: &mut DepsGraph) {
    let component_count = {
        let mut n = 0;
        for id in graph.id_handles() {
            n += graph.id_node(id).components.len();
        }
        n
    };
    log::trace!("aggregating stats for {component_count} components");

    for id in graph.id_handles() {
        graph.id_node_mut(id).time_current = Duration::ZERO;
        let components: Vec<_> = graph.id_node(id).components.values().copied().collect();
        for comp in components {
            let ops = graph.component(comp).operations.clone();
            let mut total = Duration::ZERO;
            for op in ops {
                let stats = &graph.operation(op).stats;
                total += stats.current();
                stats.flush_current();
            }
            graph.component_mut(comp).time_current = total;
            graph.id_node_mut(id).time_current += total;
        }
    }
}

/// Human-readable timing report over a graph's last aggregated pass.
///
/// Entities are listed most expensive first; entities with zero
/// recorded time are omitted.
pub struct StatsReport {
    entries: Vec<(String, Duration)>,
}

impl StatsReport {
    /// Snapshots the aggregated per-entity timings of `graph`.
    pub fn capture(graph: &DepsGraph) -> Self {
        let mut entries: Vec<(String, Duration)> = graph
            .id_handles()
            .map(|id| {
                let node = graph.id_node(id);
                (node.name.clone(), node.time_current)
            })
            .filter(|(_, time)| !time.is_zero())
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Self { entries }
    }

    /// Number of entities with recorded time.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entity recorded any time.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "no timings recorded");
        }
        for (name, time) in &self.entries {
            writeln!(f, "{:>12.3?}  {}", time, name)?;
        }
        Ok(())
    }
}

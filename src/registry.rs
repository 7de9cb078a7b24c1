//! Registry of all live dependency graphs.
//!
//! The embedding application typically keeps several graphs alive at
//! once (one per open viewpoint). Topology invalidation is global in
//! nature, so the registry offers the coarse "everything changed" tag
//! that marks every graph's relations stale, and the lazy rebuild entry
//! point that honors those tags just before a graph is next needed.

use std::collections::HashMap;

use crate::builder::{BuildDiagnostic, GraphBuilder};
use crate::entity::{EntityModel, Viewpoint};
use crate::graph::DepsGraph;

/// Owns one [`DepsGraph`] per [`Viewpoint`].
#[derive(Default)]
pub struct GraphRegistry {
    graphs: HashMap<Viewpoint, DepsGraph>,
}

impl GraphRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the graph for `viewpoint`, creating an empty (stale)
    /// graph if none exists yet.
    pub fn get_or_create(&mut self, viewpoint: Viewpoint) -> &mut DepsGraph {
        self.graphs
            .entry(viewpoint)
            .or_insert_with(|| DepsGraph::new(viewpoint))
    }

    /// Borrows the graph for `viewpoint`, if one exists.
    pub fn get(&self, viewpoint: Viewpoint) -> Option<&DepsGraph> {
        self.graphs.get(&viewpoint)
    }

    /// Mutably borrows the graph for `viewpoint`, if one exists.
    pub fn get_mut(&mut self, viewpoint: Viewpoint) -> Option<&mut DepsGraph> {
        self.graphs.get_mut(&viewpoint)
    }

    /// Drops the graph for `viewpoint`, returning it if it existed.
    pub fn remove(&mut self, viewpoint: Viewpoint) -> Option<DepsGraph> {
        self.graphs.remove(&viewpoint)
    }

    /// Number of live graphs.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether no graph is registered.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Iterates all live graphs.
    pub fn iter(&self) -> impl Iterator<Item = &DepsGraph> {
        self.graphs.values()
    }

    /// Marks the relation set of every live graph stale. Cheap; the
    /// actual rebuilds happen lazily per graph.
    pub fn tag_relations_update_all(&mut self) {
        for graph in self.graphs.values_mut() {
            graph.tag_relations_update();
        }
    }

    /// Rebuilds the graph for `viewpoint` from `model` if (and only if)
    /// its relations were tagged stale, creating the graph on first
    /// use. Returns the build diagnostics, empty when the graph was
    /// already current.
    pub fn relations_update(
        &mut self,
        viewpoint: Viewpoint,
        model: &dyn EntityModel,
    ) -> Vec<BuildDiagnostic> {
        let graph = self.get_or_create(viewpoint);
        if !graph.need_update() {
            return Vec::new();
        }
        log::debug!("rebuilding relations for {viewpoint:?}");
        GraphBuilder::new(model).build(graph)
    }
}

//! The dependency graph container.
//!
//! A [`DepsGraph`] owns all nodes and relations for one
//! [`Viewpoint`]. Topology mutation (adding nodes/relations, tagging)
//! happens strictly in the single-threaded build/tag phases; during an
//! evaluation pass the container is shared read-only across worker
//! threads, with the per-operation atomics being the only concurrently
//! mutated state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::entity::{CollectionId, EntityId, Viewpoint};
use crate::error::GraphError;
use crate::node::{
    ComponentHandle, ComponentKind, ComponentNode, IdHandle, IdNode, OpCallback, OpHandle,
    OperationNode, TimeSourceNode,
};
use crate::physics::{PhysicsRelation, PhysicsRelationKind};
use crate::relation::{Relation, RelationHandle};

/// Dependency graph for one (entity collection, viewpoint) pair.
pub struct DepsGraph {
    viewpoint: Viewpoint,
    /// Entity identity to ID node. Keys are unique; an entity's ID node
    /// is created at most once per graph.
    id_lookup: HashMap<EntityId, IdHandle>,
    ids: Vec<IdNode>,
    components: Vec<ComponentNode>,
    /// Flat arena of all operations, enabling O(n) full scans during
    /// pending-count initialization.
    operations: Vec<OperationNode>,
    relations: Vec<Relation>,
    time_source: TimeSourceNode,
    /// Relations are stale and must be rebuilt before the next
    /// evaluation.
    need_update: bool,
    /// Operations tagged directly since the last pass. Flushing starts
    /// from these; an empty set means the next pass is a no-op.
    entry_tags: HashSet<OpHandle>,
    pub(crate) physics_relations: HashMap<(CollectionId, PhysicsRelationKind), Arc<Vec<PhysicsRelation>>>,
}

impl DepsGraph {
    /// Creates an empty graph for the given viewpoint. Relations are
    /// initially stale so the first build request is honored.
    pub fn new(viewpoint: Viewpoint) -> Self {
        Self {
            viewpoint,
            id_lookup: HashMap::new(),
            ids: Vec::new(),
            components: Vec::new(),
            operations: Vec::new(),
            relations: Vec::new(),
            time_source: TimeSourceNode::default(),
            need_update: true,
            entry_tags: HashSet::new(),
            physics_relations: HashMap::new(),
        }
    }

    /// The viewpoint this graph was built for.
    pub fn viewpoint(&self) -> Viewpoint {
        self.viewpoint
    }

    // ---- Node construction (build phase only) ----

    /// Returns the ID node for `entity`, creating it if absent.
    ///
    /// On repeated calls the existing node is returned and its
    /// visibility refreshed; an entity's ID node is never duplicated.
    pub fn add_id_node(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        is_visible: bool,
    ) -> IdHandle {
        if let Some(&handle) = self.id_lookup.get(&entity) {
            self.ids[handle.index()].is_visible = is_visible;
            return handle;
        }
        let handle = IdHandle(self.ids.len() as u32);
        self.ids.push(IdNode::new(entity, name, is_visible));
        self.id_lookup.insert(entity, handle);
        handle
    }

    /// Returns the component of `kind` under `id`, creating it if
    /// absent. Exactly one component exists per (entity, kind).
    pub fn add_component(&mut self, id: IdHandle, kind: ComponentKind) -> ComponentHandle {
        if let Some(handle) = self.ids[id.index()].component(kind) {
            return handle;
        }
        let handle = ComponentHandle(self.components.len() as u32);
        self.components.push(ComponentNode::new(id, kind));
        self.ids[id.index()].components.insert(kind, handle);
        handle
    }

    /// Adds an operation under `component`.
    pub fn add_operation(
        &mut self,
        component: ComponentHandle,
        name: impl Into<String>,
        callback: OpCallback,
    ) -> OpHandle {
        let handle = OpHandle(self.operations.len() as u32);
        self.operations
            .push(OperationNode::new(component, name, callback));
        self.components[component.index()].operations.push(handle);
        handle
    }

    /// Adds a directed relation `from -> to` between two operations.
    ///
    /// A duplicate of an existing `from -> to` pair is skipped and the
    /// existing handle returned, so re-running builders never inflates
    /// pending counts.
    pub fn add_relation(
        &mut self,
        from: OpHandle,
        to: OpHandle,
        description: impl Into<String>,
    ) -> RelationHandle {
        for &rel in &self.operations[from.index()].outlinks {
            if self.relations[rel.index()].to == to {
                return rel;
            }
        }
        let handle = RelationHandle(self.relations.len() as u32);
        self.relations.push(Relation::new(from, to, description));
        self.operations[from.index()].outlinks.push(handle);
        self.operations[to.index()].inlinks.push(handle);
        handle
    }

    /// Adds a coarse component-level relation, resolved to the source
    /// component's exit operation and the target's entry operation.
    pub fn add_component_relation(
        &mut self,
        from: ComponentHandle,
        to: ComponentHandle,
        description: impl Into<String>,
    ) -> Option<RelationHandle> {
        let from_op = self.components[from.index()].exit_operation()?;
        let to_op = self.components[to.index()].entry_operation()?;
        Some(self.add_relation(from_op, to_op, description))
    }

    /// Wires an operation to the time source: the operation is
    /// invalidated whenever the evaluation time changes.
    pub fn add_time_relation(&mut self, op: OpHandle) {
        if !self.time_source.outlinks.contains(&op) {
            self.time_source.outlinks.push(op);
        }
    }

    // ---- Queries ----

    /// O(1) lookup of the ID node for an entity, `None` if the entity
    /// is unknown to this graph.
    pub fn find_id_node(&self, entity: EntityId) -> Option<IdHandle> {
        self.id_lookup.get(&entity).copied()
    }

    /// Borrows an ID node.
    pub fn id_node(&self, handle: IdHandle) -> &IdNode {
        &self.ids[handle.index()]
    }

    pub(crate) fn id_node_mut(&mut self, handle: IdHandle) -> &mut IdNode {
        &mut self.ids[handle.index()]
    }

    /// Borrows a component node.
    pub fn component(&self, handle: ComponentHandle) -> &ComponentNode {
        &self.components[handle.index()]
    }

    pub(crate) fn component_mut(&mut self, handle: ComponentHandle) -> &mut ComponentNode {
        &mut self.components[handle.index()]
    }

    /// Borrows an operation node.
    pub fn operation(&self, handle: OpHandle) -> &OperationNode {
        &self.operations[handle.index()]
    }

    pub(crate) fn operation_mut(&mut self, handle: OpHandle) -> &mut OperationNode {
        &mut self.operations[handle.index()]
    }

    /// Borrows a relation.
    pub fn relation(&self, handle: RelationHandle) -> &Relation {
        &self.relations[handle.index()]
    }

    pub(crate) fn relation_mut(&mut self, handle: RelationHandle) -> &mut Relation {
        &mut self.relations[handle.index()]
    }

    /// Number of operations in the graph.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Iterates all operation handles.
    pub fn operation_handles(&self) -> impl Iterator<Item = OpHandle> {
        (0..self.operations.len() as u32).map(OpHandle)
    }

    /// Iterates all ID node handles.
    pub fn id_handles(&self) -> impl Iterator<Item = IdHandle> {
        (0..self.ids.len() as u32).map(IdHandle)
    }

    /// Number of relations (including ones marked cyclic).
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// The time source node.
    pub fn time_source(&self) -> &TimeSourceNode {
        &self.time_source
    }

    /// Sets the current evaluation time without tagging anything.
    pub fn set_time(&mut self, time: f64) {
        self.time_source.time = time;
    }

    // ---- Tag API ----

    /// Marks one operation stale and records it as an entry tag.
    ///
    /// Also marks the owning entity's copy-on-write component so the
    /// shadow copy is refreshed. Idempotent.
    pub fn tag_operation_update(&mut self, op: OpHandle, reason: &str) {
        let node = &mut self.operations[op.index()];
        if !node.needs_update {
            log::debug!("tag_update: {} ({})", node.name, reason);
        }
        node.needs_update = true;
        self.entry_tags.insert(op);

        // Keep the shadow database consistent regardless of what was
        // tagged.
        let id = self.components[self.operations[op.index()].owner.index()].owner;
        if let Some(cow) = self.ids[id.index()].component(ComponentKind::CopyOnWrite) {
            let cow_ops: Vec<OpHandle> = self.components[cow.index()].operations.clone();
            for cow_op in cow_ops {
                if cow_op != op {
                    self.operations[cow_op.index()].needs_update = true;
                    self.entry_tags.insert(cow_op);
                }
            }
        }
    }

    /// Marks stale every operation of one component of `entity`, or of
    /// all its components when `kind` is `None`.
    ///
    /// Safe to call repeatedly; does not schedule anything by itself.
    pub fn tag_update(
        &mut self,
        entity: EntityId,
        kind: Option<ComponentKind>,
        reason: &str,
    ) -> Result<(), GraphError> {
        let id = self
            .find_id_node(entity)
            .ok_or(GraphError::UnknownEntity(entity))?;
        let components: Vec<ComponentHandle> = match kind {
            Some(kind) => {
                let comp = self.ids[id.index()]
                    .component(kind)
                    .ok_or(GraphError::UnknownComponent { entity, kind })?;
                vec![comp]
            }
            None => self.ids[id.index()].components.values().copied().collect(),
        };
        for comp in components {
            let ops: Vec<OpHandle> = self.components[comp.index()].operations.clone();
            for op in ops {
                self.tag_operation_update(op, reason);
            }
        }
        Ok(())
    }

    /// Sets the evaluation time and invalidates every time-dependent
    /// operation.
    pub fn tag_time_update(&mut self, time: f64) {
        self.time_source.time = time;
        let ops: Vec<OpHandle> = self.time_source.outlinks.clone();
        for op in ops {
            self.tag_operation_update(op, "time changed");
        }
    }

    /// Marks the relation set stale. The next relations-build request
    /// is honored; until then evaluation keeps using the old topology.
    ///
    /// Also drops all memoized physics relation lists for this graph.
    pub fn tag_relations_update(&mut self) {
        log::debug!("tag_relations_update: graph {:?}", self.viewpoint);
        self.need_update = true;
        self.physics_relations.clear();
    }

    /// Whether the relation set must be rebuilt before the next pass.
    pub fn need_update(&self) -> bool {
        self.need_update
    }

    pub(crate) fn set_relations_current(&mut self) {
        self.need_update = false;
    }

    /// ORs extra evaluation-requirement bits into an entity's ID node.
    pub fn add_eval_flag(&mut self, entity: EntityId, flags: u32) -> Result<(), GraphError> {
        let id = self
            .find_id_node(entity)
            .ok_or(GraphError::UnknownEntity(entity))?;
        self.ids[id.index()].eval_flags |= flags;
        Ok(())
    }

    /// Operations tagged directly since the last pass.
    pub fn entry_tags(&self) -> impl Iterator<Item = OpHandle> + '_ {
        self.entry_tags.iter().copied()
    }

    /// Whether anything was tagged since the last pass.
    pub fn has_entry_tags(&self) -> bool {
        !self.entry_tags.is_empty()
    }

    /// Clears all staleness tags. Called after a pass drains; any
    /// operation still tagged at that point was left stale by a cycle
    /// or consistency bug and is reported in debug builds.
    pub(crate) fn clear_tags(&mut self) {
        for op in &mut self.operations {
            op.needs_update = false;
            op.scheduled.store(false, Ordering::Relaxed);
        }
        self.entry_tags.clear();
    }

    /// Resets node/relation storage ahead of a rebuild, keeping the
    /// entity map empty so stale handles cannot alias new nodes. Also
    /// drops memoized physics lists; they describe the old topology.
    pub(crate) fn clear_nodes(&mut self) {
        self.id_lookup.clear();
        self.ids.clear();
        self.components.clear();
        self.operations.clear();
        self.relations.clear();
        self.time_source.outlinks.clear();
        self.entry_tags.clear();
        self.physics_relations.clear();
    }
}

impl std::fmt::Debug for DepsGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepsGraph")
            .field("viewpoint", &self.viewpoint)
            .field("ids", &self.ids.len())
            .field("components", &self.components.len())
            .field("operations", &self.operations.len())
            .field("relations", &self.relations.len())
            .field("need_update", &self.need_update)
            .finish()
    }
}

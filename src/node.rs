//! Typed graph nodes: ID, component, operation, and time source.
//!
//! Ownership is strictly hierarchical: the graph owns all [`IdNode`]s,
//! an `IdNode` owns its [`ComponentNode`]s, and a `ComponentNode` owns
//! its [`OperationNode`]s. Nodes never point at each other with owning
//! references; all cross-links are index handles into the graph's
//! arenas, so cyclic relations cannot create ownership cycles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::entity::{EntityId, EvalFn};
use crate::relation::RelationHandle;

/// Handle of an [`IdNode`] in the graph's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IdHandle(pub(crate) u32);

/// Handle of a [`ComponentNode`] in the graph's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentHandle(pub(crate) u32);

/// Handle of an [`OperationNode`] in the graph's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OpHandle(pub(crate) u32);

impl IdHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl ComponentHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl OpHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Semantic aspect of an entity's evaluation.
///
/// Exactly one [`ComponentNode`] exists per (entity, kind) pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ComponentKind {
    /// Maintains the entity's evaluated shadow copy. Always present,
    /// always evaluated regardless of visibility.
    CopyOnWrite,
    /// Animation playback for the entity.
    Animation,
    /// Object-space to world-space transform.
    Transform,
    /// Geometry evaluation (meshes, modifiers).
    Geometry,
    /// Armature pose solve.
    Pose,
    /// Particle state update.
    Particles,
    /// Shading/material parameters.
    Shading,
    /// External cache lookup.
    Cache,
    /// Proxy entity synchronization.
    Proxy,
}

impl ComponentKind {
    /// All kinds, in the order the builder considers them.
    pub const ALL: [ComponentKind; 9] = [
        ComponentKind::CopyOnWrite,
        ComponentKind::Animation,
        ComponentKind::Transform,
        ComponentKind::Geometry,
        ComponentKind::Pose,
        ComponentKind::Particles,
        ComponentKind::Shading,
        ComponentKind::Cache,
        ComponentKind::Proxy,
    ];
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::CopyOnWrite => "CopyOnWrite",
            ComponentKind::Animation => "Animation",
            ComponentKind::Transform => "Transform",
            ComponentKind::Geometry => "Geometry",
            ComponentKind::Pose => "Pose",
            ComponentKind::Particles => "Particles",
            ComponentKind::Shading => "Shading",
            ComponentKind::Cache => "Cache",
            ComponentKind::Proxy => "Proxy",
        };
        f.write_str(name)
    }
}

/// What an operation does when dispatched.
///
/// Resolved at node-construction time; the scheduler never inspects
/// callbacks beyond this distinction.
pub enum OpCallback {
    /// Ordinary evaluation callback, dispatched to a worker.
    Regular(EvalFn),
    /// Pure ordering placeholder: completes synchronously without
    /// occupying a worker.
    NoOp,
}

impl OpCallback {
    /// Returns `true` for the no-op variant.
    pub fn is_noop(&self) -> bool {
        matches!(self, OpCallback::NoOp)
    }
}

impl fmt::Debug for OpCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCallback::Regular(_) => f.write_str("Regular(..)"),
            OpCallback::NoOp => f.write_str("NoOp"),
        }
    }
}

/// Accumulated timing for one operation.
///
/// `current` is written only by the single worker thread executing the
/// operation within a pass, but is stored atomically so the graph can
/// stay shared (`&DepsGraph`) across workers.
#[derive(Default)]
pub struct OpStats {
    current_nanos: AtomicU64,
    total_nanos: AtomicU64,
}

impl OpStats {
    /// Clears the current-pass accumulator.
    pub fn reset_current(&self) {
        self.current_nanos.store(0, Ordering::Relaxed);
    }

    /// Adds elapsed time for the current pass.
    pub fn add_current(&self, elapsed: Duration) {
        self.current_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Time spent in this operation during the last pass.
    pub fn current(&self) -> Duration {
        Duration::from_nanos(self.current_nanos.load(Ordering::Relaxed))
    }

    /// Folds the current-pass time into the lifetime total.
    pub fn flush_current(&self) {
        let current = self.current_nanos.load(Ordering::Relaxed);
        self.total_nanos.fetch_add(current, Ordering::Relaxed);
    }

    /// Total time across all stats-collecting passes.
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }
}

/// The atomic schedulable unit of work.
pub struct OperationNode {
    /// Component this operation belongs to.
    pub owner: ComponentHandle,
    /// Human-readable name for diagnostics.
    pub name: String,
    /// What to run when the operation is dispatched.
    pub callback: OpCallback,
    /// Operation is stale and must be re-evaluated this pass.
    ///
    /// Written only in the single-threaded tag/flush/finalize phases;
    /// read-only while workers are running.
    pub needs_update: bool,
    /// Count of not-yet-satisfied prerequisite operations. Decremented
    /// atomically by finishing parents during a pass.
    pub num_links_pending: AtomicU32,
    /// At-most-once dispatch guard, claimed via compare-and-swap.
    pub scheduled: AtomicBool,
    /// Inbound relations (prerequisites).
    pub inlinks: Vec<RelationHandle>,
    /// Outbound relations (dependents).
    pub outlinks: Vec<RelationHandle>,
    /// Accumulated timing, populated only when a pass collects stats.
    pub stats: OpStats,
}

impl OperationNode {
    /// Creates a fresh operation, initially up to date.
    pub fn new(owner: ComponentHandle, name: impl Into<String>, callback: OpCallback) -> Self {
        Self {
            owner,
            name: name.into(),
            callback,
            needs_update: false,
            num_links_pending: AtomicU32::new(0),
            scheduled: AtomicBool::new(false),
            inlinks: Vec::new(),
            outlinks: Vec::new(),
            stats: OpStats::default(),
        }
    }

    /// Returns `true` if this operation is a pure ordering placeholder.
    pub fn is_noop(&self) -> bool {
        self.callback.is_noop()
    }
}

impl fmt::Debug for OperationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationNode")
            .field("name", &self.name)
            .field("callback", &self.callback)
            .field("needs_update", &self.needs_update)
            .field(
                "num_links_pending",
                &self.num_links_pending.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// One semantic aspect of one entity, owning its operations.
#[derive(Debug)]
pub struct ComponentNode {
    /// ID node this component belongs to.
    pub owner: IdHandle,
    /// Which aspect this component implements.
    pub kind: ComponentKind,
    /// Operations owned by this component, in creation order.
    pub operations: Vec<OpHandle>,
    /// Aggregated time for the last stats-collecting pass.
    pub time_current: Duration,
}

impl ComponentNode {
    pub(crate) fn new(owner: IdHandle, kind: ComponentKind) -> Self {
        Self {
            owner,
            kind,
            operations: Vec::new(),
            time_current: Duration::ZERO,
        }
    }

    /// First operation of the component: the target of inbound
    /// component-level relations.
    pub fn entry_operation(&self) -> Option<OpHandle> {
        self.operations.first().copied()
    }

    /// Last operation of the component: the source of outbound
    /// component-level relations.
    pub fn exit_operation(&self) -> Option<OpHandle> {
        self.operations.last().copied()
    }
}

/// Per-entity node owning the entity's components.
#[derive(Debug)]
pub struct IdNode {
    /// Identity of the entity this node mirrors.
    pub entity: EntityId,
    /// Human-readable name for diagnostics.
    pub name: String,
    /// Entity currently contributes to the output. Invisible entities
    /// are exempt from scheduling except for their copy-on-write
    /// component.
    pub is_visible: bool,
    /// Extra evaluation-requirement bits requested by collaborators
    /// (e.g. "needs bounding box").
    pub eval_flags: u32,
    /// Components of this entity, exactly one per kind.
    pub components: HashMap<ComponentKind, ComponentHandle>,
    /// Aggregated time for the last stats-collecting pass.
    pub time_current: Duration,
}

impl IdNode {
    pub(crate) fn new(entity: EntityId, name: impl Into<String>, is_visible: bool) -> Self {
        Self {
            entity,
            name: name.into(),
            is_visible,
            eval_flags: 0,
            components: HashMap::new(),
            time_current: Duration::ZERO,
        }
    }

    /// Returns the component of the given kind, if built.
    pub fn component(&self, kind: ComponentKind) -> Option<ComponentHandle> {
        self.components.get(&kind).copied()
    }
}

/// Represents the current evaluation time.
///
/// Operations wired to the time source are invalidated together when
/// the time changes.
#[derive(Debug, Default)]
pub struct TimeSourceNode {
    /// Current evaluation time in seconds.
    pub time: f64,
    /// Operations that must re-run whenever the time changes.
    pub outlinks: Vec<OpHandle>,
}

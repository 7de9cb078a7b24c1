//! External-collaborator types: entity identity and the entity model trait.
//!
//! The graph never owns entity data. It consumes an [`EntityModel`]
//! implementation during the build phase to learn which entities exist,
//! how they are parented, which components they support, and how each
//! component is evaluated. During the execution phase the graph only
//! invokes the opaque callbacks handed out by the model.

use std::fmt;
use std::sync::Arc;

use crate::eval::EvalContext;
use crate::node::ComponentKind;
use crate::physics::PhysicsRelationKind;

/// Stable identity of an entity in the surrounding data model.
///
/// The graph treats this as an opaque key: two `EntityId`s are the same
/// entity iff they compare equal. The embedding application is
/// responsible for never reusing an id while a graph referencing it is
/// alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// Stable identity of an entity collection (a named grouping used for
/// graph scoping and physics relation lookups).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CollectionId(pub u64);

/// Which evaluation context a graph is built for.
///
/// Visibility of an entity may differ between modes (an entity hidden
/// in the viewport can still render), so each mode gets its own graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EvalMode {
    /// Interactive viewport evaluation.
    Viewport,
    /// Final-output evaluation.
    Render,
}

/// The (root collection, evaluation mode) pair a graph instance covers.
///
/// One [`DepsGraph`](crate::graph::DepsGraph) exists per viewpoint; the
/// [`GraphRegistry`](crate::registry::GraphRegistry) keys graphs by it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Viewpoint {
    /// Root collection of entities included in the graph.
    pub collection: CollectionId,
    /// Evaluation mode determining visibility rules.
    pub mode: EvalMode,
}

/// How an entity is reachable from the viewpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LinkKind {
    /// Entity is a direct member of the viewpoint's collection.
    Directly,
    /// Entity is pulled in transitively (parenting, constraints, ...).
    /// Never a visible contributor itself: it evaluates only through
    /// its copy-on-write component or as a prerequisite of a visible
    /// entity.
    Indirectly,
}

/// Per-entity description reported by the model during a build walk.
#[derive(Clone, Debug)]
pub struct EntityInfo {
    /// Identity of the entity.
    pub id: EntityId,
    /// Human-readable name, used only in diagnostics.
    pub name: String,
    /// Parent entity, if any. The parent's transform is a prerequisite
    /// of this entity's transform.
    pub parent: Option<EntityId>,
    /// How the entity is reachable from the viewpoint.
    pub link: LinkKind,
}

/// Opaque callback evaluating one component of one entity.
///
/// Runs on a worker thread; must only read shadow state of entities
/// whose operations are guaranteed upstream by a relation, and only
/// write its own entity's shadow state.
pub type EvalFn = Arc<dyn Fn(&EvalContext) + Send + Sync>;

/// The entity data model consumed by the graph builder.
///
/// All methods are called only during the single-threaded build phase.
pub trait EntityModel {
    /// Visits every entity reachable from `viewpoint` under current
    /// visibility rules. Order is unspecified.
    fn for_each_entity(&self, viewpoint: Viewpoint, visit: &mut dyn FnMut(EntityInfo));

    /// Returns whether the entity's type supports the given component.
    fn supports(&self, entity: EntityId, kind: ComponentKind) -> bool;

    /// Returns whether the entity currently contributes to the output
    /// of the given mode.
    fn is_visible(&self, entity: EntityId, mode: EvalMode) -> bool;

    /// Returns the evaluation callback for one (entity, component)
    /// pair, or `None` for a pure ordering placeholder (no-op).
    fn evaluator(&self, entity: EntityId, kind: ComponentKind) -> Option<EvalFn>;

    /// Returns whether the entity participates in the given physics
    /// interaction (acts as a force-field effector, a collision
    /// obstacle, ...). Simulations in the same collection pick up a
    /// relation on every participant. Defaults to no participation.
    fn participates_in(&self, entity: EntityId, kind: PhysicsRelationKind) -> bool {
        let _ = (entity, kind);
        false
    }
}

//! # depsgraph
//!
//! Dependency graph evaluation engine for scene data: staleness
//! tracking, cycle-tolerant ordering, and parallel operation
//! scheduling.
//!
//! ## Core Types
//!
//! - [`DepsGraph`] — Container owning all nodes and relations for one viewpoint
//! - [`EntityModel`] — Trait the embedding data model implements for graph builds
//! - [`GraphBuilder`] — Turns an entity model into nodes and relations
//! - [`GraphRegistry`] — One graph per (collection, mode) pair, lazily rebuilt
//!
//! ## Evaluation
//!
//! - [`evaluate_on_refresh`] — Runs all stale operations in dependency order
//! - [`WorkerPool`] — Fixed-size scoped thread pool driving a pass
//! - [`EvalSettings`] / [`PassSummary`] — Per-pass options and outcome
//! - [`detect_cycles`] — Marks a back edge per cycle so passes always drain
//!
//! ## Workflow
//!
//! Build with [`GraphBuilder`] (or lazily via
//! [`GraphRegistry::relations_update`]), mark changed entities with
//! [`DepsGraph::tag_update`], then call [`evaluate_on_refresh`]. Only
//! stale operations and their downstream dependents re-run; an empty
//! tag set costs nothing.
//!
//! See `DESIGN.md` in this crate for architecture decisions and goals.

mod builder;
mod cycle;
mod entity;
mod error;
mod eval;
mod flush;
mod graph;
mod node;
mod physics;
mod registry;
mod relation;
mod stats;
mod worker_pool;

#[cfg(test)]
mod test_model;

pub use builder::{BuildDiagnostic, GraphBuilder};
pub use cycle::detect_cycles;
pub use entity::{
    CollectionId, EntityId, EntityInfo, EntityModel, EvalFn, EvalMode, LinkKind, Viewpoint,
};
pub use error::GraphError;
pub use eval::{evaluate_on_refresh, EvalContext, EvalSettings, PassSummary};
pub use graph::DepsGraph;
pub use node::{
    ComponentHandle, ComponentKind, ComponentNode, IdHandle, IdNode, OpCallback, OpHandle,
    OperationNode, OpStats, TimeSourceNode,
};
pub use physics::{PhysicsRelation, PhysicsRelationKind};
pub use registry::GraphRegistry;
pub use relation::{Relation, RelationHandle};
pub use stats::StatsReport;
pub use worker_pool::WorkerPool;

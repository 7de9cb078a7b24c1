//! Memoized physics relation lists (effectors and collisions).
//!
//! Builders repeatedly ask "which entities in this collection act as
//! effectors / colliders" while wiring relations. Computing that list
//! walks the entity model, so results are memoized per graph, keyed by
//! `(collection, kind)`. [`DepsGraph::tag_relations_update`] drops the
//! whole cache; the build phase is single-threaded so no extra locking
//! is needed here.

use std::sync::Arc;

use crate::entity::{CollectionId, EntityId};
use crate::graph::DepsGraph;

/// Which physics interaction a relation list describes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PhysicsRelationKind {
    /// Force-field effectors acting on simulations.
    Effector,
    /// Mesh collision obstacles.
    Collision,
    /// Smoke-specific collision obstacles.
    SmokeCollision,
    /// Dynamic-paint brush objects.
    DynamicBrush,
}

/// One entry of a physics relation list: an entity in the collection
/// that participates in the interaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PhysicsRelation {
    /// The participating entity.
    pub entity: EntityId,
    /// Whether the interaction also depends on the entity's geometry
    /// (colliders do, pure force fields may not).
    pub uses_geometry: bool,
}

impl DepsGraph {
    /// Returns the memoized relation list for `(collection, kind)`,
    /// computing it with `build` on the first call.
    ///
    /// Subsequent calls return the identical cached list (same `Arc`)
    /// until [`tag_relations_update`](DepsGraph::tag_relations_update)
    /// clears the cache.
    pub fn get_or_build_relations(
        &mut self,
        collection: CollectionId,
        kind: PhysicsRelationKind,
        build: impl FnOnce() -> Vec<PhysicsRelation>,
    ) -> Arc<Vec<PhysicsRelation>> {
        self.physics_relations
            .entry((collection, kind))
            .or_insert_with(|| Arc::new(build()))
            .clone()
    }

    /// Cached effector relations for a collection, `None` if never
    /// built (or invalidated since).
    pub fn get_effector_relations(
        &self,
        collection: CollectionId,
    ) -> Option<Arc<Vec<PhysicsRelation>>> {
        self.physics_relations
            .get(&(collection, PhysicsRelationKind::Effector))
            .cloned()
    }

    /// Cached collision relations of the given kind for a collection.
    pub fn get_collision_relations(
        &self,
        collection: CollectionId,
        kind: PhysicsRelationKind,
    ) -> Option<Arc<Vec<PhysicsRelation>>> {
        self.physics_relations.get(&(collection, kind)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EvalMode, Viewpoint};

    fn test_graph() -> DepsGraph {
        DepsGraph::new(Viewpoint {
            collection: CollectionId(0),
            mode: EvalMode::Viewport,
        })
    }

    fn sample_relations() -> Vec<PhysicsRelation> {
        vec![
            PhysicsRelation {
                entity: EntityId(1),
                uses_geometry: true,
            },
            PhysicsRelation {
                entity: EntityId(2),
                uses_geometry: false,
            },
        ]
    }

    #[test]
    fn first_call_builds_second_returns_cached() {
        let mut graph = test_graph();
        let collection = CollectionId(5);

        let mut build_calls = 0;
        let first = graph.get_or_build_relations(collection, PhysicsRelationKind::Effector, || {
            build_calls += 1;
            sample_relations()
        });
        assert_eq!(build_calls, 1);

        let second = graph.get_or_build_relations(collection, PhysicsRelationKind::Effector, || {
            build_calls += 1;
            Vec::new()
        });
        assert_eq!(build_calls, 1, "second call must not rebuild");
        assert!(Arc::ptr_eq(&first, &second), "identical cached list");
    }

    #[test]
    fn kinds_are_cached_independently() {
        let mut graph = test_graph();
        let collection = CollectionId(5);

        graph.get_or_build_relations(collection, PhysicsRelationKind::Effector, sample_relations);
        graph.get_or_build_relations(collection, PhysicsRelationKind::Collision, Vec::new);

        assert_eq!(
            graph
                .get_effector_relations(collection)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            graph
                .get_collision_relations(collection, PhysicsRelationKind::Collision)
                .unwrap()
                .len(),
            0
        );
        assert!(graph
            .get_collision_relations(collection, PhysicsRelationKind::SmokeCollision)
            .is_none());
    }

    #[test]
    fn tag_relations_update_clears_cache() {
        let mut graph = test_graph();
        let collection = CollectionId(5);

        let first =
            graph.get_or_build_relations(collection, PhysicsRelationKind::Effector, sample_relations);
        graph.tag_relations_update();
        assert!(graph.get_effector_relations(collection).is_none());

        let rebuilt =
            graph.get_or_build_relations(collection, PhysicsRelationKind::Effector, sample_relations);
        assert!(!Arc::ptr_eq(&first, &rebuilt), "new list after invalidation");
    }
}

//! Graph construction from an entity model.
//!
//! The builder walks every entity reachable from the graph's viewpoint
//! and emits ID/component/operation nodes plus the relations wiring
//! operations to their real data prerequisites. Building never executes
//! an operation callback; build and evaluate are strictly separate
//! phases.
//!
//! An entity with an invalid component configuration loses only the
//! problematic component: a diagnostic is recorded and the build
//! continues.

use std::collections::HashMap;
use std::fmt;

use crate::cycle;
use crate::entity::{EntityId, EntityInfo, EntityModel, LinkKind};
use crate::graph::DepsGraph;
use crate::node::{ComponentHandle, ComponentKind, OpCallback, OpHandle};
use crate::physics::{PhysicsRelation, PhysicsRelationKind};

/// A non-fatal problem found while building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDiagnostic {
    /// Entity whose component was skipped.
    pub entity: EntityId,
    /// Component kind that could not be built.
    pub kind: ComponentKind,
    /// What was wrong.
    pub message: String,
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.entity, self.kind, self.message)
    }
}

/// Builds or rebuilds a [`DepsGraph`] from an [`EntityModel`].
pub struct GraphBuilder<'a> {
    model: &'a dyn EntityModel,
    diagnostics: Vec<BuildDiagnostic>,
}

/// Per-entity handles collected during the node pass, consumed by the
/// relation pass.
struct BuiltEntity {
    info: EntityInfo,
    components: HashMap<ComponentKind, (ComponentHandle, OpHandle)>,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder reading from `model`.
    pub fn new(model: &'a dyn EntityModel) -> Self {
        Self {
            model,
            diagnostics: Vec::new(),
        }
    }

    /// Rebuilds the graph's nodes and relations from scratch, breaks
    /// any cycles, and tags every operation for a full re-evaluation.
    ///
    /// Returns the diagnostics recorded along the way.
    pub fn build(mut self, graph: &mut DepsGraph) -> Vec<BuildDiagnostic> {
        graph.clear_nodes();

        let viewpoint = graph.viewpoint();
        let mut infos: Vec<EntityInfo> = Vec::new();
        self.model
            .for_each_entity(viewpoint, &mut |info| infos.push(info));

        // Node pass: every reachable entity gets exactly one ID node.
        let mut built: Vec<BuiltEntity> = Vec::with_capacity(infos.len());
        for info in infos {
            let entity = self.build_entity_nodes(graph, info);
            built.push(entity);
        }

        // Relation pass: wire operations to their prerequisites.
        let by_entity: HashMap<EntityId, usize> = built
            .iter()
            .enumerate()
            .map(|(i, e)| (e.info.id, i))
            .collect();
        for i in 0..built.len() {
            self.build_entity_relations(graph, &built, &by_entity, i);
        }

        cycle::detect_cycles(graph);

        // Fresh topology: everything must evaluate at least once.
        let ops: Vec<OpHandle> = graph.operation_handles().collect();
        for op in ops {
            graph.tag_operation_update(op, "relations rebuilt");
        }
        graph.set_relations_current();

        for diagnostic in &self.diagnostics {
            log::warn!("build diagnostic: {diagnostic}");
        }
        self.diagnostics
    }

    /// Creates the ID node, the unconditional copy-on-write component,
    /// and one component per supported kind.
    fn build_entity_nodes(&mut self, graph: &mut DepsGraph, info: EntityInfo) -> BuiltEntity {
        // Indirectly pulled-in entities never contribute to the output
        // themselves; they evaluate only through their copy-on-write
        // component or as a prerequisite of a visible entity.
        let is_visible = info.link == LinkKind::Directly
            && self.model.is_visible(info.id, graph.viewpoint().mode);
        let id = graph.add_id_node(info.id, info.name.clone(), is_visible);

        let mut components = HashMap::new();
        for kind in ComponentKind::ALL {
            let supported = kind == ComponentKind::CopyOnWrite || self.model.supports(info.id, kind);
            if !supported {
                continue;
            }
            if let Some(message) = self.validate_component(&info, kind) {
                self.diagnostics.push(BuildDiagnostic {
                    entity: info.id,
                    kind,
                    message,
                });
                continue;
            }
            let component = graph.add_component(id, kind);
            let callback = match self.model.evaluator(info.id, kind) {
                Some(callback) => OpCallback::Regular(callback),
                None => OpCallback::NoOp,
            };
            let op = graph.add_operation(component, format!("{}:{}", info.name, kind), callback);
            components.insert(kind, (component, op));
        }

        BuiltEntity { info, components }
    }

    /// Rejects component configurations the builder cannot wire.
    fn validate_component(&self, info: &EntityInfo, kind: ComponentKind) -> Option<String> {
        let requires = |required: ComponentKind| -> Option<String> {
            if self.model.supports(info.id, required) {
                None
            } else {
                Some(format!("{kind} requires a {required} component"))
            }
        };
        match kind {
            ComponentKind::Geometry => requires(ComponentKind::Transform),
            ComponentKind::Pose => requires(ComponentKind::Animation),
            ComponentKind::Particles => requires(ComponentKind::Geometry),
            ComponentKind::Proxy if info.parent.is_none() => {
                Some("Proxy requires a parent entity".to_string())
            }
            _ => None,
        }
    }

    /// Wires one entity's operations to their prerequisites.
    fn build_entity_relations(
        &mut self,
        graph: &mut DepsGraph,
        built: &[BuiltEntity],
        by_entity: &HashMap<EntityId, usize>,
        index: usize,
    ) {
        let entity = &built[index];
        let op_of = |kind: ComponentKind| entity.components.get(&kind).map(|&(_, op)| op);

        let cow = op_of(ComponentKind::CopyOnWrite);
        let animation = op_of(ComponentKind::Animation);
        let transform = op_of(ComponentKind::Transform);
        let geometry = op_of(ComponentKind::Geometry);

        // Shadow-state relations exist regardless of visibility: every
        // evaluated aspect reads through the entity's shadow copy.
        if let Some(cow) = cow {
            for (&kind, &(_, op)) in &entity.components {
                if kind != ComponentKind::CopyOnWrite {
                    graph.add_relation(cow, op, format!("CopyOnWrite -> {kind}"));
                }
            }
        }

        if let Some(animation) = animation {
            graph.add_time_relation(animation);
            if let Some(transform) = transform {
                graph.add_relation(animation, transform, "Animation -> Transform");
            }
            if let Some(geometry) = geometry {
                graph.add_relation(animation, geometry, "Animation -> Geometry");
            }
        }

        if let Some(transform) = transform {
            if let Some(parent) = entity.info.parent {
                match by_entity
                    .get(&parent)
                    .and_then(|&i| built[i].components.get(&ComponentKind::Transform))
                {
                    Some(&(_, parent_transform)) => {
                        graph.add_relation(
                            parent_transform,
                            transform,
                            "Parent Transform -> Transform",
                        );
                    }
                    None => {
                        self.diagnostics.push(BuildDiagnostic {
                            entity: entity.info.id,
                            kind: ComponentKind::Transform,
                            message: format!("parent {parent} has no Transform in this graph"),
                        });
                    }
                }
            }
        }

        if let (Some(transform), Some(geometry)) = (transform, geometry) {
            graph.add_relation(transform, geometry, "Transform -> Geometry");
        }

        if let Some(pose) = op_of(ComponentKind::Pose) {
            if let Some(animation) = animation {
                graph.add_relation(animation, pose, "Animation -> Pose");
            }
            if let Some(geometry) = geometry {
                graph.add_relation(pose, geometry, "Pose -> Geometry");
            }
        }

        if let Some(particles) = op_of(ComponentKind::Particles) {
            graph.add_time_relation(particles);
            if let Some(transform) = transform {
                graph.add_relation(transform, particles, "Transform -> Particles");
            }
            if let Some(geometry) = geometry {
                graph.add_relation(geometry, particles, "Geometry -> Particles");
            }
            self.build_physics_relations(graph, built, by_entity, index, particles);
        }

        if let Some(shading) = op_of(ComponentKind::Shading) {
            if let Some(geometry) = geometry {
                graph.add_relation(geometry, shading, "Geometry -> Shading");
            } else if let Some(transform) = transform {
                graph.add_relation(transform, shading, "Transform -> Shading");
            }
        }

        if let Some(cache) = op_of(ComponentKind::Cache) {
            graph.add_time_relation(cache);
            if let Some(geometry) = geometry {
                graph.add_relation(cache, geometry, "Cache -> Geometry");
            }
        }

        if let Some(proxy) = op_of(ComponentKind::Proxy) {
            if let Some(transform) = transform {
                graph.add_relation(transform, proxy, "Transform -> Proxy");
            }
        }
    }

    /// Wires a simulation operation to every effector and collision
    /// obstacle in the collection.
    ///
    /// The participant lists are memoized on the graph per
    /// `(collection, kind)`, so the model is only consulted once per
    /// build no matter how many simulations the collection holds.
    fn build_physics_relations(
        &mut self,
        graph: &mut DepsGraph,
        built: &[BuiltEntity],
        by_entity: &HashMap<EntityId, usize>,
        index: usize,
        simulation: OpHandle,
    ) {
        let model = self.model;
        let own_id = built[index].info.id;
        let collection = graph.viewpoint().collection;

        for (kind, description) in [
            (PhysicsRelationKind::Effector, "Effector -> Particles"),
            (PhysicsRelationKind::Collision, "Collision -> Particles"),
        ] {
            let participants = graph.get_or_build_relations(collection, kind, || {
                built
                    .iter()
                    .filter(|e| model.participates_in(e.info.id, kind))
                    .map(|e| PhysicsRelation {
                        entity: e.info.id,
                        uses_geometry: model.supports(e.info.id, ComponentKind::Geometry),
                    })
                    .collect()
            });
            for participant in participants.iter() {
                // Simulations never depend on themselves.
                if participant.entity == own_id {
                    continue;
                }
                let Some(&i) = by_entity.get(&participant.entity) else {
                    continue;
                };
                let source_kind = if participant.uses_geometry {
                    ComponentKind::Geometry
                } else {
                    ComponentKind::Transform
                };
                if let Some(&(_, source)) = built[i].components.get(&source_kind) {
                    graph.add_relation(source, simulation, description);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CollectionId, EvalMode, Viewpoint};
    use crate::node::ComponentKind::*;
    use crate::test_model::TestModel;

    fn viewpoint() -> Viewpoint {
        Viewpoint {
            collection: CollectionId(0),
            mode: EvalMode::Viewport,
        }
    }

    fn build(model: &TestModel) -> (DepsGraph, Vec<BuildDiagnostic>) {
        let mut graph = DepsGraph::new(viewpoint());
        let diagnostics = GraphBuilder::new(model).build(&mut graph);
        (graph, diagnostics)
    }

    #[test]
    fn every_entity_gets_one_id_node_with_copy_on_write() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "a", None, &[Transform]);
        model.add_entity(EntityId(2), "b", None, &[]);
        let (graph, diagnostics) = build(&model);

        assert!(diagnostics.is_empty());
        for entity in [EntityId(1), EntityId(2)] {
            let id = graph.find_id_node(entity).expect("id node exists");
            assert!(graph.id_node(id).component(CopyOnWrite).is_some());
        }
        assert!(graph.find_id_node(EntityId(3)).is_none());
    }

    #[test]
    fn components_follow_supports() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "a", None, &[Animation, Transform, Geometry]);
        let (graph, _) = build(&model);

        let id = graph.find_id_node(EntityId(1)).unwrap();
        let node = graph.id_node(id);
        assert!(node.component(Animation).is_some());
        assert!(node.component(Transform).is_some());
        assert!(node.component(Geometry).is_some());
        assert!(node.component(Pose).is_none());
    }

    #[test]
    fn geometry_without_transform_is_skipped_with_diagnostic() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "broken", None, &[Geometry]);
        let (graph, diagnostics) = build(&model);

        let id = graph.find_id_node(EntityId(1)).unwrap();
        assert!(graph.id_node(id).component(Geometry).is_none());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, Geometry);
        assert!(diagnostics[0].message.contains("Transform"));
    }

    #[test]
    fn pose_without_animation_is_skipped() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "rig", None, &[Transform, Pose]);
        let (graph, diagnostics) = build(&model);

        let id = graph.find_id_node(EntityId(1)).unwrap();
        assert!(graph.id_node(id).component(Pose).is_none());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn bad_component_does_not_abort_the_rest() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "broken", None, &[Geometry]);
        model.add_entity(EntityId(2), "fine", None, &[Transform]);
        let (graph, diagnostics) = build(&model);

        assert_eq!(diagnostics.len(), 1);
        let id = graph.find_id_node(EntityId(2)).unwrap();
        assert!(graph.id_node(id).component(Transform).is_some());
    }

    #[test]
    fn parent_transform_relation_wired() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "parent", None, &[Transform]);
        model.add_entity(EntityId(2), "child", Some(EntityId(1)), &[Transform]);
        let (graph, _) = build(&model);

        let op = |entity, kind| {
            let id = graph.find_id_node(entity).unwrap();
            let comp = graph.id_node(id).component(kind).unwrap();
            graph.component(comp).operations[0]
        };
        let parent_t = op(EntityId(1), Transform);
        let child_t = op(EntityId(2), Transform);

        let wired = (0..graph.relation_count() as u32).any(|i| {
            let rel = graph.relation(crate::relation::RelationHandle(i));
            rel.from == parent_t && rel.to == child_t
        });
        assert!(wired, "parent transform must precede child transform");
    }

    #[test]
    fn copy_on_write_relations_for_every_component() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "a", None, &[Animation, Transform, Geometry]);
        let (graph, _) = build(&model);

        let id = graph.find_id_node(EntityId(1)).unwrap();
        let cow_op = {
            let comp = graph.id_node(id).component(CopyOnWrite).unwrap();
            graph.component(comp).operations[0]
        };
        // CoW -> Animation, Transform, Geometry
        assert_eq!(graph.operation(cow_op).outlinks.len(), 3);
    }

    #[test]
    fn unknown_parent_records_diagnostic_but_builds() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "orphan", Some(EntityId(99)), &[Transform]);
        let (graph, diagnostics) = build(&model);

        assert!(graph.find_id_node(EntityId(1)).is_some());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("parent"));
    }

    #[test]
    fn rebuild_does_not_duplicate_nodes() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "a", None, &[Transform, Geometry]);

        let mut graph = DepsGraph::new(viewpoint());
        GraphBuilder::new(&model).build(&mut graph);
        let ops_first = graph.operation_count();
        let rels_first = graph.relation_count();

        GraphBuilder::new(&model).build(&mut graph);
        assert_eq!(graph.operation_count(), ops_first);
        assert_eq!(graph.relation_count(), rels_first);
    }

    #[test]
    fn build_clears_need_update_and_tags_everything() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "a", None, &[Transform]);

        let mut graph = DepsGraph::new(viewpoint());
        assert!(graph.need_update());
        GraphBuilder::new(&model).build(&mut graph);

        assert!(!graph.need_update());
        for op in graph.operation_handles() {
            assert!(graph.operation(op).needs_update);
        }
    }

    #[test]
    fn time_dependent_operations_wired_to_time_source() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "a", None, &[Animation, Transform]);
        let (graph, _) = build(&model);

        assert_eq!(graph.time_source().outlinks.len(), 1);
    }

    fn op(graph: &DepsGraph, entity: EntityId, kind: ComponentKind) -> OpHandle {
        let id = graph.find_id_node(entity).unwrap();
        let comp = graph.id_node(id).component(kind).unwrap();
        graph.component(comp).operations[0]
    }

    fn has_relation(graph: &DepsGraph, from: OpHandle, to: OpHandle) -> bool {
        (0..graph.relation_count() as u32).any(|i| {
            let rel = graph.relation(crate::relation::RelationHandle(i));
            rel.from == from && rel.to == to
        })
    }

    #[test]
    fn build_wires_simulation_to_colliders_and_populates_cache() {
        let mut model = TestModel::new();
        model.add_entity(
            EntityId(1),
            "emitter",
            None,
            &[Transform, Geometry, Particles],
        );
        model.add_entity(EntityId(2), "obstacle", None, &[Transform, Geometry]);
        model.set_physics_role(EntityId(2), PhysicsRelationKind::Collision);
        let (graph, diagnostics) = build(&model);
        assert!(diagnostics.is_empty());

        let cached = graph
            .get_collision_relations(CollectionId(0), PhysicsRelationKind::Collision)
            .expect("build populates the cache");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].entity, EntityId(2));
        assert!(cached[0].uses_geometry);

        let obstacle_geometry = op(&graph, EntityId(2), Geometry);
        let particles = op(&graph, EntityId(1), Particles);
        assert!(
            has_relation(&graph, obstacle_geometry, particles),
            "obstacle geometry must precede the simulation"
        );
    }

    #[test]
    fn geometryless_effector_wires_through_its_transform() {
        let mut model = TestModel::new();
        model.add_entity(
            EntityId(1),
            "emitter",
            None,
            &[Transform, Geometry, Particles],
        );
        model.add_entity(EntityId(2), "field", None, &[Transform]);
        model.set_physics_role(EntityId(2), PhysicsRelationKind::Effector);
        let (graph, _) = build(&model);

        let cached = graph
            .get_effector_relations(CollectionId(0))
            .expect("build populates the cache");
        assert!(!cached[0].uses_geometry);

        let field_transform = op(&graph, EntityId(2), Transform);
        let particles = op(&graph, EntityId(1), Particles);
        assert!(has_relation(&graph, field_transform, particles));
    }

    #[test]
    fn indirectly_linked_entity_built_invisible() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "linked", None, &[Transform]);
        model.set_indirectly_linked(EntityId(1));
        let (graph, _) = build(&model);

        // Still fully built, but exempt from scheduling like any
        // invisible entity.
        let id = graph.find_id_node(EntityId(1)).unwrap();
        assert!(!graph.id_node(id).is_visible);
        assert!(graph.id_node(id).component(Transform).is_some());
    }

    #[test]
    fn invisible_entity_still_gets_nodes() {
        let mut model = TestModel::new();
        model.add_entity(EntityId(1), "hidden", None, &[Transform]);
        model.set_visible(EntityId(1), false);
        let (graph, _) = build(&model);

        let id = graph.find_id_node(EntityId(1)).unwrap();
        assert!(!graph.id_node(id).is_visible);
        assert!(graph.id_node(id).component(Transform).is_some());
    }
}

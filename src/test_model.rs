//! Instrumented entity model used across the crate's tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::entity::{EntityId, EntityInfo, EntityModel, EvalFn, EvalMode, LinkKind, Viewpoint};
use crate::node::ComponentKind;
use crate::physics::PhysicsRelationKind;

struct TestEntity {
    name: String,
    parent: Option<EntityId>,
    components: Vec<ComponentKind>,
    visible: bool,
    link: LinkKind,
    physics: Vec<PhysicsRelationKind>,
}

/// Entity model with per-operation dispatch logging and run counters.
pub(crate) struct TestModel {
    entities: HashMap<EntityId, TestEntity>,
    order: Vec<EntityId>,
    dispatch_log: Arc<Mutex<Vec<String>>>,
    run_counts: Arc<Mutex<HashMap<(EntityId, ComponentKind), u32>>>,
    delay: Arc<Mutex<Duration>>,
}

impl TestModel {
    pub(crate) fn new() -> Self {
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
            dispatch_log: Arc::new(Mutex::new(Vec::new())),
            run_counts: Arc::new(Mutex::new(HashMap::new())),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Registers an entity supporting the given components (the
    /// copy-on-write component is implicit and always present).
    pub(crate) fn add_entity(
        &mut self,
        id: EntityId,
        name: &str,
        parent: Option<EntityId>,
        components: &[ComponentKind],
    ) {
        self.entities.insert(
            id,
            TestEntity {
                name: name.to_string(),
                parent,
                components: components.to_vec(),
                visible: true,
                link: LinkKind::Directly,
                physics: Vec::new(),
            },
        );
        self.order.push(id);
    }

    pub(crate) fn set_visible(&mut self, id: EntityId, visible: bool) {
        self.entities.get_mut(&id).unwrap().visible = visible;
    }

    /// Marks the entity as only transitively reachable from the
    /// viewpoint.
    pub(crate) fn set_indirectly_linked(&mut self, id: EntityId) {
        self.entities.get_mut(&id).unwrap().link = LinkKind::Indirectly;
    }

    /// Registers the entity as a participant in a physics interaction.
    pub(crate) fn set_physics_role(&mut self, id: EntityId, kind: PhysicsRelationKind) {
        self.entities.get_mut(&id).unwrap().physics.push(kind);
    }

    /// Makes every evaluator sleep for `delay`, for timing tests.
    pub(crate) fn set_evaluator_delay(&mut self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Operation names in the order callbacks were invoked.
    pub(crate) fn dispatch_log(&self) -> Vec<String> {
        self.dispatch_log.lock().clone()
    }

    /// How many times one (entity, component) evaluator ran.
    pub(crate) fn run_count(&self, id: EntityId, kind: ComponentKind) -> u32 {
        self.run_counts
            .lock()
            .get(&(id, kind))
            .copied()
            .unwrap_or(0)
    }

    /// Clears the dispatch log and run counters.
    pub(crate) fn clear_instrumentation(&self) {
        self.dispatch_log.lock().clear();
        self.run_counts.lock().clear();
    }
}

impl EntityModel for TestModel {
    fn for_each_entity(&self, _viewpoint: Viewpoint, visit: &mut dyn FnMut(EntityInfo)) {
        for id in &self.order {
            let entity = &self.entities[id];
            visit(EntityInfo {
                id: *id,
                name: entity.name.clone(),
                parent: entity.parent,
                link: entity.link,
            });
        }
    }

    fn supports(&self, entity: EntityId, kind: ComponentKind) -> bool {
        match self.entities.get(&entity) {
            Some(e) => kind == ComponentKind::CopyOnWrite || e.components.contains(&kind),
            None => false,
        }
    }

    fn is_visible(&self, entity: EntityId, _mode: EvalMode) -> bool {
        self.entities.get(&entity).map_or(false, |e| e.visible)
    }

    fn evaluator(&self, entity: EntityId, kind: ComponentKind) -> Option<EvalFn> {
        let name = self.entities.get(&entity)?.name.clone();
        let log = Arc::clone(&self.dispatch_log);
        let counts = Arc::clone(&self.run_counts);
        let delay = Arc::clone(&self.delay);
        Some(Arc::new(move |_ctx| {
            let pause = *delay.lock();
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
            log.lock().push(format!("{name}:{kind}"));
            *counts.lock().entry((entity, kind)).or_insert(0) += 1;
        }))
    }

    fn participates_in(&self, entity: EntityId, kind: PhysicsRelationKind) -> bool {
        self.entities
            .get(&entity)
            .map_or(false, |e| e.physics.contains(&kind))
    }
}

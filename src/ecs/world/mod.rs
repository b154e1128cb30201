//! The World is the central container for all entities, components, and
//! systems in the ECS.
//!
//! A `World` manages the lifecycle of entities and their component data, the
//! query index that keeps declarative queries consistent with entity state,
//! and the scheduler that drives systems once per tick.
//!
//! # Architecture
//!
//! The World coordinates several subsystems:
//! - **Component Registry**: dense type ids, schemas, and object pools
//! - **Entity Store**: record arena, deferred-removal queues, name table
//! - **Query Index**: interned queries with reactive event logs
//! - **Emitter**: world-level lifecycle events and counters
//! - **Scheduler**: priority-ordered system execution
//!
//! # Example
//!
//! ```rust,ignore
//! let mut world = World::new();
//! world.register_component::<Position>(PoolOption::Default);
//! world.register_system(Movement, Attributes::default());
//!
//! let entity = world.spawn();
//! world.entity_mut(entity).unwrap().add::<Position>();
//!
//! loop {
//!     world.execute();
//! }
//! ```
//!
//! # Ticks
//!
//! One call to [`execute`](World::execute) is one tick: enabled systems run
//! in order, each observing query results and reactive events at its own
//! observation point, and the tick ends with the deferred-removal barrier
//! releasing detached component instances and removed entity records back to
//! their pools.

use std::time::Instant;

use crate::ecs::{
    component::{self, Component, PoolOption, Registry, registry::PoolStats},
    entity::{Entity, Ref, RefMut, Store},
    event::{Counters, Emitter, WorldEvent},
    query::{self, index::QueryStats},
    schedule::{Scheduler, SystemStats},
    system::{Attributes, System},
};

/// World construction options.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Entity records to pre-allocate in the store's pool.
    pub entity_pool_size: usize,
    /// When false, every component and entity removal applies immediately.
    /// Intended for tests that want removals visible without a tick barrier.
    pub deferred_removal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entity_pool_size: 0,
            deferred_removal: true,
        }
    }
}

/// The root aggregate of the ECS.
pub struct World {
    components: Registry,
    entities: Store,
    queries: query::Index,
    events: Emitter,
    systems: Scheduler,
    enabled: bool,
    started: Instant,
    last_time: f64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// A world with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A world with explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            components: Registry::new(),
            entities: Store::new(config.deferred_removal, config.entity_pool_size),
            queries: query::Index::new(),
            events: Emitter::new(),
            systems: Scheduler::new(),
            enabled: true,
            started: Instant::now(),
            last_time: 0.0,
        }
    }

    fn frame(&mut self) -> Frame<'_> {
        Frame::new(
            &self.components,
            &mut self.entities,
            &mut self.queries,
            &mut self.events,
        )
    }

    /// Register a component type.
    ///
    /// Re-registration warns and keeps the existing registration.
    pub fn register_component<C: Component>(&mut self, pool: PoolOption) -> component::Id {
        self.components.register::<C>(pool)
    }

    /// True when component type `C` is registered.
    pub fn has_registered_component<C: Component>(&self) -> bool {
        self.components.is_registered::<C>()
    }

    /// The dense id assigned to component type `C`, if registered.
    pub fn component_id<C: Component>(&self) -> Option<component::Id> {
        self.components.id_of::<C>()
    }

    /// The component registry.
    #[inline]
    pub fn components(&self) -> &Registry {
        &self.components
    }

    /// Create a new entity.
    pub fn spawn(&mut self) -> Entity {
        self.frame().spawn()
    }

    /// Create a new entity bound to a name. A name collision warns and keeps
    /// the first binding.
    pub fn spawn_named(&mut self, name: &str) -> Entity {
        self.frame().spawn_named(name)
    }

    /// Remove an entity. With `immediate` false, reclamation waits for the
    /// end of the tick; either way the entity leaves query results now
    /// (except through system-state components, which keep it as a ghost).
    ///
    /// # Panics
    ///
    /// Panics if the entity is not in the store.
    pub fn despawn(&mut self, entity: Entity, immediate: bool) {
        self.frame().despawn(entity, immediate);
    }

    /// A read-only reference to an entity.
    pub fn entity(&self, entity: Entity) -> Option<Ref<'_>> {
        self.entities
            .contains(entity)
            .then(|| Ref::new(&self.entities, &self.components, entity))
    }

    /// A mutable reference to an entity.
    pub fn entity_mut(&mut self, entity: Entity) -> Option<RefMut<'_>> {
        self.entities.contains(entity).then(|| {
            RefMut::new(
                &mut self.entities,
                &self.components,
                &mut self.queries,
                &mut self.events,
                entity,
            )
        })
    }

    /// Look an entity up by name.
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.entities.entity_by_name(name)
    }

    /// Number of entities in the store, ghosts included.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Create a new entity carrying copies of the source's attached
    /// components. Pending removals are not propagated.
    pub fn clone_entity(&mut self, source: Entity) -> Entity {
        self.frame().clone_entity(source)
    }

    /// Copy the source entity's attached components onto the destination.
    pub fn copy_entity(&mut self, destination: Entity, source: Entity) {
        self.frame().copy_entity(destination, source);
    }

    /// Resolve a query and return its current results.
    ///
    /// The query is interned like any system-declared query, so later calls
    /// and systems share it.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor names an unregistered component type or
    /// includes no component type.
    pub fn query(&mut self, descriptor: &query::Descriptor) -> Vec<Entity> {
        self.frame().query(descriptor)
    }

    /// Register a system with the scheduler. Duplicate registration of the
    /// same system type warns and is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if a declared query names an unregistered component type or
    /// includes no component type.
    pub fn register_system<S: System>(&mut self, system: S, attributes: Attributes) {
        let World {
            components,
            entities,
            queries,
            systems,
            ..
        } = self;
        systems.register(components, entities, queries, system, attributes);
    }

    /// Unregister a system by type. Unknown types are a no-op.
    pub fn unregister_system<S: System>(&mut self) {
        self.systems.unregister::<S>();
    }

    /// A registered system by type.
    pub fn system<S: System>(&self) -> Option<&S> {
        self.systems.get::<S>()
    }

    /// A registered system by type, mutably.
    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems.get_mut::<S>()
    }

    /// Per-system registration and execution info, in registration order.
    pub fn systems(&self) -> Vec<SystemStats> {
        self.systems.stats()
    }

    /// Enable one system and call its `play` hook.
    pub fn play_system<S: System>(&mut self) {
        self.systems.play::<S>();
    }

    /// Disable one system from the next tick onward and call its `stop`
    /// hook.
    pub fn stop_system<S: System>(&mut self) {
        self.systems.stop::<S>();
    }

    /// Execute one tick, deriving `delta` and `time` from the world's
    /// monotonic clock. Does nothing while the world is stopped.
    pub fn execute(&mut self) {
        if !self.enabled {
            return;
        }
        let time = self.started.elapsed().as_secs_f64();
        let delta = (time - self.last_time) as f32;
        self.last_time = time;
        self.run(delta, time);
    }

    /// Execute one tick with caller-provided timing.
    pub fn execute_with(&mut self, delta: f32, time: f64) {
        if !self.enabled {
            return;
        }
        self.run(delta, time);
    }

    fn run(&mut self, delta: f32, time: f64) {
        let World {
            components,
            entities,
            queries,
            events,
            systems,
            ..
        } = self;
        systems.run(components, entities, queries, events, delta, time);
    }

    /// Stop the world: ticks become no-ops and every system's `stop` hook
    /// runs.
    pub fn stop(&mut self) {
        self.enabled = false;
        self.systems.stop_all();
    }

    /// Resume the world and every system.
    pub fn play(&mut self) {
        self.enabled = true;
        self.systems.play_all();
    }

    /// True while the world executes ticks.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Observe world lifecycle events ([`WorldEvent`]).
    pub fn observe(&mut self, listener: impl FnMut(&WorldEvent) + 'static) {
        self.events.observe(listener);
    }

    /// Run the deferred-removal barrier outside a tick. `execute` already
    /// does this once per tick.
    pub fn process_deferred_removal(&mut self) {
        let World {
            components,
            entities,
            queries,
            events,
            ..
        } = self;
        entities.process_deferred_removal(components, queries, events);
    }

    /// A snapshot of world counters: entities, queries, pools, events, and
    /// per-system execution times.
    pub fn stats(&self) -> Stats {
        Stats {
            entities: self.entities.len(),
            ghosts: self.entities.ghosts(),
            pooled_entities: self.entities.pooled(),
            queries: self.queries.stats(),
            pools: self.components.pool_stats(),
            events: self.events.counters(),
            systems: self.systems.stats(),
        }
    }
}

/// Counters reported by [`World::stats`].
#[derive(Debug, Clone)]
pub struct Stats {
    /// Entities in the store, ghosts included.
    pub entities: usize,
    /// Non-alive entities retained by system-state components.
    pub ghosts: usize,
    /// Pooled entity records ready for reuse.
    pub pooled_entities: usize,
    /// Per-query matched entity counts.
    pub queries: Vec<QueryStats>,
    /// Per-component-type pool usage.
    pub pools: Vec<PoolStats>,
    /// Cumulative world event counts.
    pub events: Counters,
    /// Per-system execution stats.
    pub systems: Vec<SystemStats>,
}

/// The mutable world view systems receive while executing.
///
/// A frame exposes the same entity and component operations as the world;
/// structural system registration is deliberately absent. Query results read
/// through [`Frame::query`] reflect live memberships, unlike the snapshots a
/// system receives as its
/// [`Queries`](crate::ecs::system::Queries) argument.
pub struct Frame<'w> {
    components: &'w Registry,
    entities: &'w mut Store,
    queries: &'w mut query::Index,
    events: &'w mut Emitter,
}

impl<'w> Frame<'w> {
    pub(crate) fn new(
        components: &'w Registry,
        entities: &'w mut Store,
        queries: &'w mut query::Index,
        events: &'w mut Emitter,
    ) -> Self {
        Self {
            components,
            entities,
            queries,
            events,
        }
    }

    /// The component registry.
    #[inline]
    pub fn components(&self) -> &Registry {
        self.components
    }

    /// The dense id assigned to component type `C`, if registered.
    pub fn component_id<C: Component>(&self) -> Option<component::Id> {
        self.components.id_of::<C>()
    }

    /// Create a new entity.
    pub fn spawn(&mut self) -> Entity {
        self.entities.spawn(self.events, None)
    }

    /// Create a new entity bound to a name.
    pub fn spawn_named(&mut self, name: &str) -> Entity {
        self.entities.spawn(self.events, Some(name))
    }

    /// Remove an entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not in the store.
    pub fn despawn(&mut self, entity: Entity, immediate: bool) {
        self.entities.remove(
            self.components,
            self.queries,
            self.events,
            entity,
            immediate,
        );
    }

    /// A read-only reference to an entity.
    pub fn entity(&self, entity: Entity) -> Option<Ref<'_>> {
        self.entities
            .contains(entity)
            .then(|| Ref::new(self.entities, self.components, entity))
    }

    /// A mutable reference to an entity.
    pub fn entity_mut(&mut self, entity: Entity) -> Option<RefMut<'_>> {
        self.entities.contains(entity).then(|| {
            RefMut::new(
                self.entities,
                self.components,
                self.queries,
                self.events,
                entity,
            )
        })
    }

    /// Look an entity up by name.
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.entities.entity_by_name(name)
    }

    /// Create a new entity carrying copies of the source's attached
    /// components.
    pub fn clone_entity(&mut self, source: Entity) -> Entity {
        let entity = self.spawn();
        self.copy_entity(entity, source);
        entity
    }

    /// Copy the source entity's attached components onto the destination.
    pub fn copy_entity(&mut self, destination: Entity, source: Entity) {
        self.entities.copy_components(
            self.components,
            self.queries,
            self.events,
            destination,
            source,
        );
    }

    /// Resolve a query and return its current (live) results.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor names an unregistered component type or
    /// includes no component type.
    pub fn query(&mut self, descriptor: &query::Descriptor) -> Vec<Entity> {
        let (id, _) = self
            .queries
            .get_or_create(self.components, self.entities, descriptor);
        self.queries.query(id).entities().to_vec()
    }
}

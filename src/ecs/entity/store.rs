//! Entity records, attachment bookkeeping, and the deferred-removal barrier.
//!
//! The [`Store`] owns every entity record in an arena indexed by slot. A
//! record tracks the entity's attached component mask and instances, the
//! parallel pending-removal mask and instances, the query back-pointer list,
//! and the count of attached system-state components.
//!
//! # Deferred removal
//!
//! Detaching a component or removing an entity is deferred by default: the
//! component instance moves to the record's pending set (still readable via
//! the include-removed accessors) and the entity is queued. Query membership
//! changes immediately; storage is reclaimed only when
//! [`process_deferred_removal`](Store::process_deferred_removal) runs at the
//! end of the tick. Pending instances flush before entity records, so a
//! record never reaches the free list while still owning instances.
//!
//! # Ghost entities
//!
//! Removing an entity detaches its ordinary components but leaves
//! system-state components in place. While any remain, the record stays in
//! the store as a non-alive ghost; detaching the last one triggers the
//! entity's reclamation, honoring the immediate flag of that detach.

use std::collections::HashMap;
use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::ecs::{
    component::{self, Instance, Kind, Registry, View, ViewMut},
    event::{Emitter, WorldEvent},
    field::Value,
    query,
};

use super::{Entity, Generation, Id};

/// Grow-then-set, since fixed bitsets do not grow on insert.
fn grow_insert(mask: &mut FixedBitSet, bit: usize) {
    mask.grow(bit + 1);
    mask.insert(bit);
}

/// One entity's state inside the store arena.
pub(crate) struct Record {
    /// Monotonic world-scoped id, never reused.
    pub(crate) public_id: u64,
    /// Current generation of this slot.
    pub(crate) generation: Generation,
    /// Slot currently holds an entity (alive or ghost).
    in_store: bool,
    /// False once the entity has been logically removed.
    pub(crate) alive: bool,
    name: Option<String>,
    /// Attached component types.
    pub(crate) mask: FixedBitSet,
    /// Component types detached this tick, instances still readable.
    pub(crate) pending_mask: FixedBitSet,
    components: Vec<Option<Instance>>,
    pending: Vec<Option<Instance>>,
    /// Queries currently containing this entity.
    pub(crate) queries: Vec<query::Id>,
    /// Attached or pending components of system-state kind.
    pub(crate) state_components: u32,
    /// Position in the store's live list.
    live_index: usize,
    queued_removal: bool,
    queued_pending: bool,
}

impl Record {
    fn new() -> Self {
        Self {
            public_id: 0,
            generation: Generation::FIRST,
            in_store: false,
            alive: false,
            name: None,
            mask: FixedBitSet::new(),
            pending_mask: FixedBitSet::new(),
            components: Vec::new(),
            pending: Vec::new(),
            queries: Vec::new(),
            state_components: 0,
            live_index: 0,
            queued_removal: false,
            queued_pending: false,
        }
    }
}

/// The entity store: record arena, free-slot pool, deferred-removal queues.
pub struct Store {
    records: Vec<Record>,
    /// Reclaimed slots ready for reuse.
    free: Vec<u32>,
    /// Entities currently in the store, ghosts included.
    live: Vec<Entity>,
    names: HashMap<String, Entity>,
    next_public_id: u64,
    /// Entities queued for end-of-tick reclamation.
    to_remove: Vec<Entity>,
    /// Entities with pending component removals.
    with_pending: Vec<Entity>,
    /// When false, every detach and removal applies immediately.
    deferred_enabled: bool,
}

impl Store {
    /// A store with `pool_size` pre-allocated entity records.
    pub fn new(deferred_enabled: bool, pool_size: usize) -> Self {
        let mut store = Self {
            records: Vec::with_capacity(pool_size),
            free: Vec::with_capacity(pool_size),
            live: Vec::new(),
            names: HashMap::new(),
            next_public_id: 0,
            to_remove: Vec::new(),
            with_pending: Vec::new(),
            deferred_enabled,
        };
        for slot in 0..pool_size {
            store.records.push(Record::new());
            store.free.push(slot as u32);
        }
        store
    }

    /// True when the store holds this entity, ghost or alive.
    pub fn contains(&self, entity: Entity) -> bool {
        self.records
            .get(entity.index())
            .is_some_and(|record| record.in_store && record.generation == entity.generation())
    }

    fn rec(&self, entity: Entity) -> Option<&Record> {
        self.records
            .get(entity.index())
            .filter(|record| record.in_store && record.generation == entity.generation())
    }

    fn rec_mut(&mut self, entity: Entity) -> Option<&mut Record> {
        self.records
            .get_mut(entity.index())
            .filter(|record| record.in_store && record.generation == entity.generation())
    }

    fn expect_rec_mut(&mut self, entity: Entity) -> &mut Record {
        self.rec_mut(entity)
            .unwrap_or_else(|| panic!("entity {entity:?} is not in the store"))
    }

    pub(crate) fn record_mut(&mut self, entity: Entity) -> &mut Record {
        self.expect_rec_mut(entity)
    }

    /// True when the entity is in the store and not logically removed.
    pub fn alive(&self, entity: Entity) -> bool {
        self.rec(entity).is_some_and(|record| record.alive)
    }

    /// The entity's world-scoped monotonic id.
    pub fn public_id(&self, entity: Entity) -> Option<u64> {
        self.rec(entity).map(|record| record.public_id)
    }

    /// The entity's registered name, if any.
    pub fn name_of(&self, entity: Entity) -> Option<&str> {
        self.rec(entity).and_then(|record| record.name.as_deref())
    }

    /// Look an entity up by registered name.
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.names.get(name).copied()
    }

    /// The entities currently in the store, ghosts included.
    #[inline]
    pub fn live(&self) -> &[Entity] {
        &self.live
    }

    /// Number of entities in the store, ghosts included.
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True when the store holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of non-alive entities retained by system-state components.
    pub fn ghosts(&self) -> usize {
        self.live
            .iter()
            .filter(|entity| !self.records[entity.index()].alive)
            .count()
    }

    /// Number of pooled entity records ready for reuse.
    #[inline]
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Create a new entity, optionally binding a name.
    ///
    /// A name collision warns and leaves the first binding in place; the
    /// entity is still created.
    pub fn spawn(&mut self, events: &mut Emitter, name: Option<&str>) -> Entity {
        let slot = match self.free.pop() {
            Some(slot) => slot as usize,
            None => {
                self.records.push(Record::new());
                self.records.len() - 1
            }
        };
        let public_id = self.next_public_id;
        self.next_public_id += 1;
        let live_index = self.live.len();

        let record = &mut self.records[slot];
        record.in_store = true;
        record.alive = true;
        record.public_id = public_id;
        record.live_index = live_index;
        let entity = Entity::new_with_generation(Id::from(slot as u32), record.generation);
        self.live.push(entity);

        if let Some(name) = name {
            if self.names.contains_key(name) {
                log::warn!("entity name '{name}' is already bound, keeping the first binding");
            } else {
                self.names.insert(name.to_owned(), entity);
                self.records[slot].name = Some(name.to_owned());
            }
        }

        events.emit(WorldEvent::EntityCreated(entity));
        entity
    }

    /// Attach a component to an entity, optionally copying partial init
    /// values over the schema defaults.
    ///
    /// Attaching an already attached type warns and leaves the entity
    /// untouched. Attaching a type whose removal is still pending releases
    /// the pending instance first, so the attached and pending sets stay
    /// disjoint.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not in the store or the component type id is
    /// unknown to the registry.
    pub fn attach(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
        entity: Entity,
        id: component::Id,
        init: &[(&str, Value)],
    ) {
        let info = registry.info(id);
        let index = id.index();
        let record = self.expect_rec_mut(entity);

        if record.mask.contains(index) {
            log::warn!(
                "component '{}' is already attached to entity {}",
                info.name(),
                record.public_id
            );
            return;
        }

        if record.pending_mask.contains(index) {
            let pending = record.pending[index]
                .take()
                .expect("pending bit set without instance");
            record.pending_mask.set(index, false);
            if info.kind() == Kind::SystemState {
                record.state_components -= 1;
            }
            registry.release(id, pending);
        }

        let mut instance = registry.acquire(id);
        if !init.is_empty() {
            info.schema().apply(&mut instance, init);
        }
        if record.components.len() <= index {
            record.components.resize_with(index + 1, || None);
        }
        record.components[index] = Some(instance);
        grow_insert(&mut record.mask, index);
        if info.kind() == Kind::SystemState {
            record.state_components += 1;
        }

        queries.on_attach(record, entity, id);
        events.emit(WorldEvent::ComponentAdded(entity, id));
    }

    /// Detach a component from an entity.
    ///
    /// Missing components are a no-op. Query membership updates immediately
    /// either way; with `immediate` false the instance moves to the pending
    /// set and is released at the end of the tick.
    pub fn detach(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
        entity: Entity,
        id: component::Id,
        immediate: bool,
    ) {
        let immediate = immediate || !self.deferred_enabled;
        let index = id.index();
        let Some(record) = self.rec_mut(entity) else {
            return;
        };
        if !record.mask.contains(index) {
            return;
        }

        events.emit(WorldEvent::ComponentRemoved(entity, id));
        let info = registry.info(id);
        let record = self.expect_rec_mut(entity);
        let instance = record.components[index]
            .take()
            .expect("attached bit set without instance");
        record.mask.set(index, false);
        queries.on_detach(record, entity, id);

        if immediate {
            registry.release(id, instance);
            let record = self.expect_rec_mut(entity);
            if info.kind() == Kind::SystemState {
                record.state_components -= 1;
                if !record.alive && record.state_components == 0 {
                    self.finish_removal(registry, queries, events, entity, true);
                }
            }
        } else {
            if record.pending.len() <= index {
                record.pending.resize_with(index + 1, || None);
            }
            record.pending[index] = Some(instance);
            grow_insert(&mut record.pending_mask, index);
            // System-state components stay counted until the flush releases
            // the pending instance.
            if !record.queued_pending {
                record.queued_pending = true;
                self.with_pending.push(entity);
            }
        }
    }

    /// Detach every removable component, in reverse attachment-id order.
    /// System-state components are skipped; they only detach explicitly.
    pub fn detach_all(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
        entity: Entity,
        immediate: bool,
    ) {
        let Some(record) = self.rec(entity) else {
            return;
        };
        let types: Vec<component::Id> = record.mask.ones().map(component::Id::from).collect();
        for id in types.into_iter().rev() {
            if registry.kind(id) == Kind::SystemState {
                continue;
            }
            self.detach(registry, queries, events, entity, id, immediate);
        }
    }

    /// Logically remove an entity.
    ///
    /// Ordinary components detach (honoring `immediate`); system-state
    /// components remain. If none remain the entity leaves every query and
    /// is reclaimed now or at the end of the tick; otherwise it lingers as a
    /// ghost until its last system-state component detaches.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not in the store.
    pub fn remove(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
        entity: Entity,
        immediate: bool,
    ) {
        let immediate = immediate || !self.deferred_enabled;
        let record = self.expect_rec_mut(entity);
        if !record.alive {
            // Already logically removed; the ghost waits on its
            // system-state components.
            return;
        }
        record.alive = false;
        self.detach_all(registry, queries, events, entity, immediate);
        let record = self.expect_rec_mut(entity);
        if record.state_components == 0 {
            self.finish_removal(registry, queries, events, entity, immediate);
        }
    }

    /// Emit the removal event, strip query memberships, and reclaim the
    /// record now or at end of tick.
    fn finish_removal(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
        entity: Entity,
        immediate: bool,
    ) {
        events.emit(WorldEvent::EntityRemoved(entity));
        let record = self.expect_rec_mut(entity);
        queries.on_entity_removed(record, entity);
        if immediate {
            self.release_record(registry, entity);
        } else {
            record.queued_removal = true;
            self.to_remove.push(entity);
        }
    }

    /// Return the record to the free pool, bumping its generation so stale
    /// handles stop resolving.
    fn release_record(&mut self, registry: &Registry, entity: Entity) {
        let slot = entity.index();
        let record = &mut self.records[slot];
        debug_assert_eq!(record.mask.count_ones(..), 0, "record released with components");

        // Entities despawned immediately can still own pending instances.
        let leftovers: Vec<usize> = record.pending_mask.ones().collect();
        for index in leftovers {
            let instance = record.pending[index]
                .take()
                .expect("pending bit set without instance");
            registry.release(component::Id::from(index), instance);
        }

        let name = record.name.take();
        let live_index = record.live_index;
        record.in_store = false;
        record.alive = false;
        record.mask.clear();
        record.pending_mask.clear();
        record.queries.clear();
        record.state_components = 0;
        record.queued_removal = false;
        record.queued_pending = false;
        record.generation = record.generation.next();

        if let Some(name) = name {
            self.names.remove(&name);
        }
        self.live.swap_remove(live_index);
        if live_index < self.live.len() {
            let moved = self.live[live_index];
            self.records[moved.index()].live_index = live_index;
        }
        self.free.push(slot as u32);
    }

    /// The end-of-tick barrier: release pending component instances, then
    /// reclaim queued entity records.
    pub fn process_deferred_removal(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
    ) {
        let pending = std::mem::take(&mut self.with_pending);
        for entity in pending {
            if !self.contains(entity) {
                continue;
            }
            let record = &mut self.records[entity.index()];
            record.queued_pending = false;
            let types: Vec<usize> = record.pending_mask.ones().collect();
            for index in types.into_iter().rev() {
                let id = component::Id::from(index);
                let instance = record.pending[index]
                    .take()
                    .expect("pending bit set without instance");
                record.pending_mask.set(index, false);
                if registry.kind(id) == Kind::SystemState {
                    record.state_components -= 1;
                }
                registry.release(id, instance);
            }
            let ghost_finished =
                !record.alive && record.state_components == 0 && !record.queued_removal;
            if ghost_finished {
                self.finish_removal(registry, queries, events, entity, true);
            }
        }

        let removals = std::mem::take(&mut self.to_remove);
        for entity in removals {
            if !self.contains(entity) {
                continue;
            }
            let record = &mut self.records[entity.index()];
            record.queued_removal = false;
            if !record.alive {
                self.release_record(registry, entity);
            }
        }
    }

    /// Read-only view of an attached component, or with `include_removed`
    /// also a component pending removal.
    pub fn component(
        &self,
        registry: &Registry,
        entity: Entity,
        id: component::Id,
        include_removed: bool,
    ) -> Option<View<'_>> {
        let record = self.rec(entity)?;
        let index = id.index();
        let instance = if record.mask.contains(index) {
            record.components[index].as_ref()
        } else if include_removed && record.pending_mask.contains(index) {
            record.pending[index].as_ref()
        } else {
            None
        }?;
        Some(View::new(Arc::clone(registry.info(id).schema()), instance))
    }

    /// Read-only view of a component pending removal, for systems reacting
    /// to `removed` events.
    pub fn removed_component(
        &self,
        registry: &Registry,
        entity: Entity,
        id: component::Id,
    ) -> Option<View<'_>> {
        let record = self.rec(entity)?;
        let index = id.index();
        if !record.pending_mask.contains(index) {
            return None;
        }
        let instance = record.pending[index].as_ref()?;
        Some(View::new(Arc::clone(registry.info(id).schema()), instance))
    }

    /// Mutable view of an attached component. Announces the access to every
    /// reactive query listening for changes of this type on this entity,
    /// whether or not a field is then written.
    pub fn component_mut(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        entity: Entity,
        id: component::Id,
    ) -> Option<ViewMut<'_>> {
        let index = id.index();
        {
            let record = self.rec(entity)?;
            if !record.mask.contains(index) {
                return None;
            }
            queries.notify_changed(record, entity, id);
        }
        let record = self.records.get_mut(entity.index())?;
        let instance = record.components[index].as_mut()?;
        Some(ViewMut::new(
            Arc::clone(registry.info(id).schema()),
            instance,
        ))
    }

    /// True when the component is attached, or pending removal with
    /// `include_removed`.
    pub fn has_component(&self, entity: Entity, id: component::Id, include_removed: bool) -> bool {
        self.rec(entity).is_some_and(|record| {
            record.mask.contains(id.index())
                || (include_removed && record.pending_mask.contains(id.index()))
        })
    }

    /// True when every listed component type is attached.
    pub fn has_all(&self, entity: Entity, ids: &[component::Id]) -> bool {
        self.rec(entity)
            .is_some_and(|record| ids.iter().all(|id| record.mask.contains(id.index())))
    }

    /// True when any listed component type is attached.
    pub fn has_any(&self, entity: Entity, ids: &[component::Id]) -> bool {
        self.rec(entity)
            .is_some_and(|record| ids.iter().any(|id| record.mask.contains(id.index())))
    }

    /// The attached component types, in id order.
    pub fn component_types(&self, entity: Entity) -> Vec<component::Id> {
        self.rec(entity)
            .map(|record| record.mask.ones().map(component::Id::from).collect())
            .unwrap_or_default()
    }

    /// The component types pending removal, in id order.
    pub fn removal_pending_types(&self, entity: Entity) -> Vec<component::Id> {
        self.rec(entity)
            .map(|record| record.pending_mask.ones().map(component::Id::from).collect())
            .unwrap_or_default()
    }

    /// Views of every attached component.
    pub fn components(&self, registry: &Registry, entity: Entity) -> Vec<View<'_>> {
        self.component_types(entity)
            .into_iter()
            .filter_map(|id| self.component(registry, entity, id, false))
            .collect()
    }

    /// Views of every component pending removal.
    pub fn components_to_remove(&self, registry: &Registry, entity: Entity) -> Vec<View<'_>> {
        self.removal_pending_types(entity)
            .into_iter()
            .filter_map(|id| self.removed_component(registry, entity, id))
            .collect()
    }

    /// Copy the source entity's attached components onto the destination: a
    /// snapshot of attached state only, pending removals are not propagated.
    /// Types missing on the destination are attached first.
    ///
    /// # Panics
    ///
    /// Panics if either entity is not in the store.
    pub fn copy_components(
        &mut self,
        registry: &Registry,
        queries: &mut query::Index,
        events: &mut Emitter,
        destination: Entity,
        source: Entity,
    ) {
        assert!(
            self.contains(source),
            "entity {source:?} is not in the store"
        );
        let types = self.component_types(source);
        for id in types {
            let info = registry.info(id);
            let cloned = {
                let record = self.rec(source).expect("source checked above");
                let instance = record.components[id.index()]
                    .as_ref()
                    .expect("attached bit set without instance");
                info.schema().clone_instance(instance)
            };
            if !self.has_component(destination, id, false) {
                self.attach(registry, queries, events, destination, id, &[]);
            }
            let record = self.expect_rec_mut(destination);
            let instance = record.components[id.index()]
                .as_mut()
                .expect("attached bit set without instance");
            info.schema().copy(&cloned, instance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Component, PoolOption, Schema};
    use crate::ecs::field;
    use crate::ecs::query::{Descriptor, with};

    struct Health;

    impl Component for Health {
        fn name() -> &'static str {
            "Health"
        }

        fn schema() -> Schema {
            Schema::builder()
                .field("hp", field::number(), Some(Value::from(10)))
                .finish()
        }
    }

    struct Lifetime;

    impl Component for Lifetime {
        fn name() -> &'static str {
            "Lifetime"
        }

        fn schema() -> Schema {
            Schema::builder()
                .field("handle", field::reference(), None)
                .finish()
        }

        fn kind() -> Kind {
            Kind::SystemState
        }
    }

    struct Harness {
        registry: Registry,
        queries: query::Index,
        events: Emitter,
        store: Store,
    }

    impl Harness {
        fn new() -> Self {
            let registry = Registry::new();
            registry.register::<Health>(PoolOption::Default);
            registry.register::<Lifetime>(PoolOption::Default);
            Self {
                registry,
                queries: query::Index::new(),
                events: Emitter::new(),
                store: Store::new(true, 0),
            }
        }

        fn health(&self) -> component::Id {
            self.registry.expect_id::<Health>()
        }

        fn lifetime(&self) -> component::Id {
            self.registry.expect_id::<Lifetime>()
        }
    }

    #[test]
    fn spawn_assigns_monotonic_public_ids() {
        // Given
        let mut h = Harness::new();

        // When
        let e1 = h.store.spawn(&mut h.events, None);
        let e2 = h.store.spawn(&mut h.events, None);

        // Then
        assert_eq!(h.store.public_id(e1), Some(0));
        assert_eq!(h.store.public_id(e2), Some(1));
        assert!(h.store.alive(e1));
        assert_eq!(h.store.len(), 2);
    }

    #[test]
    fn spawn_reuses_pooled_records_with_fresh_ids() {
        // Given
        let mut h = Harness::new();
        let e1 = h.store.spawn(&mut h.events, None);
        h.store
            .remove(&h.registry, &mut h.queries, &mut h.events, e1, true);

        // When
        let e2 = h.store.spawn(&mut h.events, None);

        // Then - Same slot, new generation, new public id
        assert_eq!(e2.id(), e1.id());
        assert_ne!(e2.generation(), e1.generation());
        assert_eq!(h.store.public_id(e2), Some(1));
        assert!(!h.store.contains(e1));
    }

    #[test]
    fn duplicate_names_keep_first_binding() {
        // Given
        let mut h = Harness::new();

        // When
        let first = h.store.spawn(&mut h.events, Some("boss"));
        let _second = h.store.spawn(&mut h.events, Some("boss"));

        // Then
        assert_eq!(h.store.entity_by_name("boss"), Some(first));
    }

    #[test]
    fn attach_then_immediate_detach_restores_pre_attach_state() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();

        // When
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[],
        );
        h.store
            .detach(&h.registry, &mut h.queries, &mut h.events, entity, health, true);
        h.store
            .process_deferred_removal(&h.registry, &mut h.queries, &mut h.events);

        // Then - Observationally back where we started
        assert!(!h.store.has_component(entity, health, true));
        assert!(h.store.component_types(entity).is_empty());
        assert_eq!(h.registry.pool_stats()[0].used, 0);
    }

    #[test]
    fn duplicate_attach_is_a_noop() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[("hp", Value::from(3))],
        );

        // When - Second attach with different init values
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[("hp", Value::from(99))],
        );

        // Then - First attachment untouched, one instance in use
        let view = h
            .store
            .component(&h.registry, entity, health, false)
            .unwrap();
        assert_eq!(view.number("hp"), 3.0);
        assert_eq!(h.registry.pool_stats()[0].used, 1);
    }

    #[test]
    fn deferred_detach_keeps_instance_readable_until_flush() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[("hp", Value::from(5))],
        );

        // When
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            false,
        );

        // Then - Logically gone, still readable through the removed accessors
        assert!(!h.store.has_component(entity, health, false));
        assert!(h.store.has_component(entity, health, true));
        let view = h
            .store
            .removed_component(&h.registry, entity, health)
            .unwrap();
        assert_eq!(view.number("hp"), 5.0);
        assert_eq!(h.registry.pool_stats()[0].used, 1);

        // When
        h.store
            .process_deferred_removal(&h.registry, &mut h.queries, &mut h.events);

        // Then
        assert!(!h.store.has_component(entity, health, true));
        assert_eq!(h.registry.pool_stats()[0].used, 0);
    }

    #[test]
    fn reattach_over_pending_removal_keeps_sets_disjoint() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[("hp", Value::from(5))],
        );
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            false,
        );

        // When - Re-attach while the old instance is pending
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[],
        );

        // Then - Attached with defaults, pending instance gone
        assert!(h.store.has_component(entity, health, false));
        assert!(h.store.removed_component(&h.registry, entity, health).is_none());
        let view = h
            .store
            .component(&h.registry, entity, health, false)
            .unwrap();
        assert_eq!(view.number("hp"), 10.0);
        assert_eq!(h.registry.pool_stats()[0].used, 1);

        // When - The flush has nothing left to do for this entity
        h.store
            .process_deferred_removal(&h.registry, &mut h.queries, &mut h.events);

        // Then
        assert!(h.store.has_component(entity, health, false));
        assert_eq!(h.registry.pool_stats()[0].used, 1);
    }

    #[test]
    fn ghost_lingers_until_last_state_component_detaches() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        let lifetime = h.lifetime();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[],
        );
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            lifetime,
            &[],
        );

        // When - Remove with the state component still attached
        h.store
            .remove(&h.registry, &mut h.queries, &mut h.events, entity, true);

        // Then - Ghost: not alive, still in the store, still has the state component
        assert!(!h.store.alive(entity));
        assert!(h.store.contains(entity));
        assert!(!h.store.has_component(entity, health, true));
        assert!(h.store.has_component(entity, lifetime, false));
        assert_eq!(h.store.ghosts(), 1);

        // When - Detach the last state component
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            lifetime,
            true,
        );

        // Then - Reclaimed
        assert!(!h.store.contains(entity));
        assert_eq!(h.store.len(), 0);
        assert_eq!(h.events.counters().entity_removed, 1);
    }

    #[test]
    fn deferred_state_component_detach_reclaims_ghost_at_flush() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let lifetime = h.lifetime();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            lifetime,
            &[],
        );
        h.store
            .remove(&h.registry, &mut h.queries, &mut h.events, entity, false);

        // When - Deferred detach keeps the ghost until the barrier
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            lifetime,
            false,
        );
        assert!(h.store.contains(entity));

        h.store
            .process_deferred_removal(&h.registry, &mut h.queries, &mut h.events);

        // Then
        assert!(!h.store.contains(entity));
        assert_eq!(h.registry.pool_stats()[1].used, 0);
    }

    #[test]
    fn immediate_despawn_with_pending_components_releases_them() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[],
        );
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            false,
        );

        // When - Despawn immediately while the detach is still pending
        h.store
            .remove(&h.registry, &mut h.queries, &mut h.events, entity, true);
        h.store
            .process_deferred_removal(&h.registry, &mut h.queries, &mut h.events);

        // Then - No instance leaked
        assert_eq!(h.registry.pool_stats()[0].used, 0);
        assert!(!h.store.contains(entity));
    }

    #[test]
    #[should_panic(expected = "not in the store")]
    fn removing_a_stale_handle_panics() {
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        h.store
            .remove(&h.registry, &mut h.queries, &mut h.events, entity, true);
        // Second removal through the stale handle is a contract violation.
        h.store
            .remove(&h.registry, &mut h.queries, &mut h.events, entity, true);
    }

    #[test]
    fn query_membership_follows_detach_and_flush() {
        // Given
        let mut h = Harness::new();
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        let (query, _) = h.queries.get_or_create(
            &h.registry,
            &mut h.store,
            &Descriptor::new([with::<Health>()]),
        );

        // When
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[],
        );

        // Then
        assert_eq!(h.queries.query(query).entities(), &[entity]);

        // When - Deferred detach updates membership immediately
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            false,
        );

        // Then
        assert!(h.queries.query(query).entities().is_empty());
    }

    #[test]
    fn copy_components_snapshots_attached_state() {
        // Given
        let mut h = Harness::new();
        let source = h.store.spawn(&mut h.events, None);
        let destination = h.store.spawn(&mut h.events, None);
        let health = h.health();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            source,
            health,
            &[("hp", Value::from(42))],
        );

        // When
        h.store.copy_components(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            destination,
            source,
        );

        // Then - Deep copy, independent instances
        let view = h
            .store
            .component(&h.registry, destination, health, false)
            .unwrap();
        assert_eq!(view.number("hp"), 42.0);
        assert_eq!(h.registry.pool_stats()[0].used, 2);
    }

    #[test]
    fn disabled_deferral_applies_removals_immediately() {
        // Given
        let mut h = Harness::new();
        h.store = Store::new(false, 0);
        let entity = h.store.spawn(&mut h.events, None);
        let health = h.health();
        h.store.attach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            &[],
        );

        // When - Requested deferred, applied immediately
        h.store.detach(
            &h.registry,
            &mut h.queries,
            &mut h.events,
            entity,
            health,
            false,
        );

        // Then
        assert!(!h.store.has_component(entity, health, true));
        assert_eq!(h.registry.pool_stats()[0].used, 0);
    }
}

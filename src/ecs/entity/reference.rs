//! Borrow-scoped entity references.
//!
//! [`Ref`] and [`RefMut`] bundle an entity handle with the world subsystems
//! needed to operate on it, exposing the entity surface (attach, detach,
//! component access, lifecycle) without threading four arguments through
//! every call site. A `Ref` can only read; a `RefMut` can mutate the entity
//! and its components.

use crate::ecs::{
    component::{self, Component, Registry, View, ViewMut},
    event::Emitter,
    field::Value,
    query,
};

use super::{Entity, Store};

/// A read-only reference to an entity in the store.
pub struct Ref<'w> {
    store: &'w Store,
    registry: &'w Registry,
    entity: Entity,
}

impl<'w> Ref<'w> {
    pub(crate) fn new(store: &'w Store, registry: &'w Registry, entity: Entity) -> Self {
        Self {
            store,
            registry,
            entity,
        }
    }

    /// The entity handle.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The entity's world-scoped monotonic id.
    pub fn id(&self) -> u64 {
        self.store
            .public_id(self.entity)
            .expect("reference to entity not in store")
    }

    /// True while the entity has not been logically removed.
    #[inline]
    pub fn alive(&self) -> bool {
        self.store.alive(self.entity)
    }

    /// The entity's registered name, if any.
    #[inline]
    pub fn name(&self) -> Option<&'w str> {
        self.store.name_of(self.entity)
    }

    /// True when component type `C` is attached.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not registered in this world.
    pub fn has<C: Component>(&self) -> bool {
        self.store
            .has_component(self.entity, self.registry.expect_id::<C>(), false)
    }

    /// True when component type `C` is attached or pending removal.
    pub fn has_including_removed<C: Component>(&self) -> bool {
        self.store
            .has_component(self.entity, self.registry.expect_id::<C>(), true)
    }

    /// True when every listed component type is attached.
    #[inline]
    pub fn has_all(&self, ids: &[component::Id]) -> bool {
        self.store.has_all(self.entity, ids)
    }

    /// True when any listed component type is attached.
    #[inline]
    pub fn has_any(&self, ids: &[component::Id]) -> bool {
        self.store.has_any(self.entity, ids)
    }

    /// Read an attached component of type `C`.
    pub fn get<C: Component>(&self) -> Option<View<'w>> {
        self.store
            .component(self.registry, self.entity, self.registry.expect_id::<C>(), false)
    }

    /// Read a component of type `C`, attached or pending removal.
    pub fn get_including_removed<C: Component>(&self) -> Option<View<'w>> {
        self.store
            .component(self.registry, self.entity, self.registry.expect_id::<C>(), true)
    }

    /// Read a component of type `C` that is pending removal, for reacting to
    /// `removed` events.
    pub fn get_removed<C: Component>(&self) -> Option<View<'w>> {
        self.store
            .removed_component(self.registry, self.entity, self.registry.expect_id::<C>())
    }

    /// Views of every attached component.
    pub fn components(&self) -> Vec<View<'w>> {
        self.store.components(self.registry, self.entity)
    }

    /// Views of every component pending removal.
    pub fn components_to_remove(&self) -> Vec<View<'w>> {
        self.store.components_to_remove(self.registry, self.entity)
    }

    /// The attached component types, in id order.
    pub fn component_types(&self) -> Vec<component::Id> {
        self.store.component_types(self.entity)
    }
}

/// A mutable reference to an entity in the store.
pub struct RefMut<'w> {
    store: &'w mut Store,
    registry: &'w Registry,
    queries: &'w mut query::Index,
    events: &'w mut Emitter,
    entity: Entity,
}

impl<'w> RefMut<'w> {
    pub(crate) fn new(
        store: &'w mut Store,
        registry: &'w Registry,
        queries: &'w mut query::Index,
        events: &'w mut Emitter,
        entity: Entity,
    ) -> Self {
        Self {
            store,
            registry,
            queries,
            events,
            entity,
        }
    }

    /// Downgrade to a read-only reference.
    #[inline]
    pub fn as_ref(&self) -> Ref<'_> {
        Ref::new(self.store, self.registry, self.entity)
    }

    /// The entity handle.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The entity's world-scoped monotonic id.
    pub fn id(&self) -> u64 {
        self.as_ref().id()
    }

    /// True while the entity has not been logically removed.
    #[inline]
    pub fn alive(&self) -> bool {
        self.store.alive(self.entity)
    }

    /// The entity's registered name, if any.
    pub fn name(&self) -> Option<&str> {
        self.store.name_of(self.entity)
    }

    /// Attach component type `C` with schema defaults.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not registered in this world.
    pub fn add<C: Component>(&mut self) -> &mut Self {
        self.add_with::<C>(&[])
    }

    /// Attach component type `C`, copying partial init values over the
    /// schema defaults.
    pub fn add_with<C: Component>(&mut self, init: &[(&str, Value)]) -> &mut Self {
        let id = self.registry.expect_id::<C>();
        self.store
            .attach(self.registry, self.queries, self.events, self.entity, id, init);
        self
    }

    /// Detach component type `C`. With `immediate` false the instance stays
    /// readable through the removed accessors until the end of the tick.
    pub fn remove<C: Component>(&mut self, immediate: bool) -> &mut Self {
        let id = self.registry.expect_id::<C>();
        self.store.detach(
            self.registry,
            self.queries,
            self.events,
            self.entity,
            id,
            immediate,
        );
        self
    }

    /// Detach every removable component. System-state components stay.
    pub fn remove_all(&mut self, immediate: bool) -> &mut Self {
        self.store.detach_all(
            self.registry,
            self.queries,
            self.events,
            self.entity,
            immediate,
        );
        self
    }

    /// True when component type `C` is attached.
    pub fn has<C: Component>(&self) -> bool {
        self.as_ref().has::<C>()
    }

    /// True when component type `C` is attached or pending removal.
    pub fn has_including_removed<C: Component>(&self) -> bool {
        self.as_ref().has_including_removed::<C>()
    }

    /// True when every listed component type is attached.
    pub fn has_all(&self, ids: &[component::Id]) -> bool {
        self.store.has_all(self.entity, ids)
    }

    /// True when any listed component type is attached.
    pub fn has_any(&self, ids: &[component::Id]) -> bool {
        self.store.has_any(self.entity, ids)
    }

    /// Read an attached component of type `C`.
    pub fn get<C: Component>(&self) -> Option<View<'_>> {
        self.store
            .component(self.registry, self.entity, self.registry.expect_id::<C>(), false)
    }

    /// Read a component of type `C`, attached or pending removal.
    pub fn get_including_removed<C: Component>(&self) -> Option<View<'_>> {
        self.store
            .component(self.registry, self.entity, self.registry.expect_id::<C>(), true)
    }

    /// Read a component of type `C` that is pending removal.
    pub fn get_removed<C: Component>(&self) -> Option<View<'_>> {
        self.store
            .removed_component(self.registry, self.entity, self.registry.expect_id::<C>())
    }

    /// Mutably access an attached component of type `C`.
    ///
    /// Taking the view announces a change to every reactive query listening
    /// for this component type on this entity, whether or not a field is
    /// subsequently written.
    pub fn get_mut<C: Component>(&mut self) -> Option<ViewMut<'_>> {
        let id = self.registry.expect_id::<C>();
        self.store
            .component_mut(self.registry, self.queries, self.entity, id)
    }

    /// Views of every attached component.
    pub fn components(&self) -> Vec<View<'_>> {
        self.store.components(self.registry, self.entity)
    }

    /// Views of every component pending removal.
    pub fn components_to_remove(&self) -> Vec<View<'_>> {
        self.store.components_to_remove(self.registry, self.entity)
    }

    /// The attached component types, in id order.
    pub fn component_types(&self) -> Vec<component::Id> {
        self.store.component_types(self.entity)
    }

    /// Copy the source entity's attached components onto this entity.
    pub fn copy_from(&mut self, source: Entity) -> &mut Self {
        self.store.copy_components(
            self.registry,
            self.queries,
            self.events,
            self.entity,
            source,
        );
        self
    }

    /// Remove this entity from the world.
    pub fn despawn(self, immediate: bool) {
        self.store.remove(
            self.registry,
            self.queries,
            self.events,
            self.entity,
            immediate,
        );
    }
}

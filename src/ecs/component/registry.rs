use std::{
    any::TypeId,
    sync::RwLock,
    sync::atomic::{AtomicU32, Ordering},
};

use dashmap::DashMap;

use std::sync::Arc;

use super::{Component, Id, Info, Instance, Kind, Pool, PoolOption};

/// The component type registry. Responsible for assigning each component type
/// a dense identifier on first registration, holding its schema and kind, and
/// owning the object pool its instances are drawn from.
///
/// The registry uses interior mutability throughout: lock-free reads for the
/// TypeId to component Id lookup via `DashMap`, and short write locks for the
/// descriptor table and pools. Everything works through a shared reference,
/// which is what lets systems acquire and release instances while the rest of
/// the world is borrowed. The core is single-executor, so the locks are
/// uncontended by construction.
pub struct Registry {
    /// Map from TypeId to component Id. Lock-free reads via sharded concurrent hashmap.
    type_map: DashMap<TypeId, Id>,

    /// List of registered component descriptors.
    infos: RwLock<Vec<Option<Info>>>,

    /// One pool per registered component type, indexed by Id.
    pools: RwLock<Vec<Pool>>,

    /// Next available component identifier.
    next_id: AtomicU32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new component registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            pools: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register a component type and get its identifier.
    ///
    /// Registration is idempotent: re-registering an already known type warns
    /// and returns the existing id without touching its pool. Tag components
    /// are legal to pool; their instances are just empty.
    pub fn register<C: Component>(&self, pool: PoolOption) -> Id {
        let type_id = TypeId::of::<C>();

        if let Some(id) = self.type_map.get(&type_id) {
            log::warn!("component type '{}' already registered", C::name());
            return *id;
        }

        *self
            .type_map
            .entry(type_id)
            .or_insert_with(|| {
                // Generate a new unique identifier
                let id_value = self.next_id.fetch_add(1, Ordering::Relaxed);
                let comp_id = Id::new(id_value);
                let schema = Arc::new(C::schema());

                // Install the descriptor
                let mut infos = self.infos.write().unwrap();
                let index = id_value as usize;
                if index >= infos.len() {
                    infos.resize_with(index + 1, || None);
                }
                infos[index] = Some(Info::new(comp_id, C::name(), C::kind(), Arc::clone(&schema)));

                // Install the pool
                let mut installed = match pool {
                    PoolOption::Default => Pool::new(),
                    PoolOption::Disabled => Pool::dummy(),
                    PoolOption::Custom(pool) => pool,
                };
                installed.install(&schema, comp_id);
                let mut pools = self.pools.write().unwrap();
                if index >= pools.len() {
                    pools.resize_with(index + 1, Pool::new);
                }
                pools[index] = installed;

                comp_id
            })
            .value()
    }

    /// Get the component Id for type `C`, if registered.
    #[inline]
    pub fn id_of<C: Component>(&self) -> Option<Id> {
        let type_id = TypeId::of::<C>();
        self.type_map.get(&type_id).map(|entry| *entry.value())
    }

    /// True when type `C` is registered in this world.
    #[inline]
    pub fn is_registered<C: Component>(&self) -> bool {
        self.id_of::<C>().is_some()
    }

    /// Get the component Id for a raw `TypeId`, if registered. Used when
    /// resolving query terms, which erase the component type.
    #[inline]
    pub(crate) fn id_by_type(&self, type_id: TypeId) -> Option<Id> {
        self.type_map.get(&type_id).map(|entry| *entry.value())
    }

    /// Get the component Id for type `C`.
    ///
    /// # Panics
    ///
    /// Panics if `C` was never registered. Using an unregistered component
    /// type is a contract violation.
    pub fn expect_id<C: Component>(&self) -> Id {
        self.id_of::<C>().unwrap_or_else(|| {
            panic!(
                "component type '{}' is not registered in this world",
                C::name()
            )
        })
    }

    /// Descriptor for a component type by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never assigned by this registry.
    pub fn info(&self, id: Id) -> Info {
        let infos = self.infos.read().unwrap();
        infos
            .get(id.index())
            .and_then(|info| info.clone())
            .unwrap_or_else(|| panic!("unknown component type id {:?}", id))
    }

    /// The kind of a component type by id.
    #[inline]
    pub fn kind(&self, id: Id) -> Kind {
        self.info(id).kind()
    }

    /// Number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    /// True when no component types are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquire an instance of the given component type from its pool.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never assigned by this registry.
    pub fn acquire(&self, id: Id) -> Instance {
        let info = self.info(id);
        let mut pools = self.pools.write().unwrap();
        pools[id.index()].acquire(info.schema(), id)
    }

    /// Release an instance back to its component type's pool.
    pub fn release(&self, id: Id, instance: Instance) {
        debug_assert_eq!(instance.type_id(), id);
        let info = self.info(id);
        let mut pools = self.pools.write().unwrap();
        pools[id.index()].release(info.schema(), instance);
    }

    /// Per-pool usage snapshot for stats.
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let infos = self.infos.read().unwrap();
        let pools = self.pools.read().unwrap();
        infos
            .iter()
            .flatten()
            .map(|info| {
                let pool = &pools[info.id().index()];
                PoolStats {
                    name: info.name(),
                    used: pool.used(),
                    total: pool.total(),
                    free: pool.free(),
                }
            })
            .collect()
    }
}

/// Usage snapshot of one component type's pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// The component type's display name.
    pub name: &'static str,
    /// Instances currently held by entities.
    pub used: usize,
    /// Instances constructed so far.
    pub total: usize,
    /// Ready instances, or `None` when pooling is disabled.
    pub free: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Schema;
    use crate::ecs::field::{self, Value};

    struct Position;

    impl Component for Position {
        fn name() -> &'static str {
            "Position"
        }

        fn schema() -> Schema {
            Schema::builder()
                .field("x", field::number(), None)
                .field("y", field::number(), None)
                .finish()
        }
    }

    struct Velocity;

    impl Component for Velocity {
        fn name() -> &'static str {
            "Velocity"
        }

        fn schema() -> Schema {
            Schema::builder()
                .field("dx", field::number(), Some(Value::from(1)))
                .finish()
        }
    }

    struct Frozen;

    impl Component for Frozen {
        fn name() -> &'static str {
            "Frozen"
        }

        fn schema() -> Schema {
            Schema::empty()
        }

        fn kind() -> Kind {
            Kind::Tag
        }
    }

    #[test]
    fn registration_assigns_dense_ids() {
        // Given
        let registry = Registry::new();

        // When
        let pos_id = registry.register::<Position>(PoolOption::Default);
        let vel_id = registry.register::<Velocity>(PoolOption::Default);

        // Then
        assert_ne!(pos_id, vel_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_of::<Position>(), Some(pos_id));
        assert_eq!(registry.id_of::<Velocity>(), Some(vel_id));

        // Then - Registering the same type again keeps the same id
        assert_eq!(registry.register::<Position>(PoolOption::Default), pos_id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn info_carries_schema_and_kind() {
        // Given
        let registry = Registry::new();
        let id = registry.register::<Frozen>(PoolOption::Default);

        // When
        let info = registry.info(id);

        // Then
        assert_eq!(info.name(), "Frozen");
        assert_eq!(info.kind(), Kind::Tag);
        assert!(info.schema().is_empty());
    }

    #[test]
    fn unregistered_lookup_is_none() {
        // Given
        let registry = Registry::new();

        // Then
        assert_eq!(registry.id_of::<Position>(), None);
        assert!(!registry.is_registered::<Position>());
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn expect_id_panics_for_unknown_type() {
        let registry = Registry::new();
        registry.expect_id::<Position>();
    }

    #[test]
    fn acquire_and_release_track_usage() {
        // Given
        let registry = Registry::new();
        let id = registry.register::<Velocity>(PoolOption::Default);

        // When
        let instance = registry.acquire(id);

        // Then
        assert_eq!(instance.values()[0], Value::from(1));
        assert_eq!(registry.pool_stats()[0].used, 1);

        // When
        registry.release(id, instance);

        // Then
        assert_eq!(registry.pool_stats()[0].used, 0);
    }

    #[test]
    fn disabled_pooling_reports_unbounded_free() {
        // Given
        let registry = Registry::new();
        let id = registry.register::<Position>(PoolOption::Disabled);

        // When
        let _instance = registry.acquire(id);
        let stats = registry.pool_stats();

        // Then
        assert_eq!(stats[0].free, None);
        assert_eq!(stats[0].used, 1);
    }

    #[test]
    fn custom_pool_is_preallocated() {
        // Given
        let registry = Registry::new();

        // When
        let id = registry.register::<Position>(PoolOption::Custom(Pool::with_initial(8)));
        let stats = registry.pool_stats();

        // Then
        assert_eq!(id.index(), 0);
        assert_eq!(stats[0].total, 8);
        assert_eq!(stats[0].free, Some(8));
    }
}

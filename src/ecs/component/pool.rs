//! Object pooling for component instances.
//!
//! Attaching a component acquires an instance from the type's [`Pool`];
//! detaching eventually releases it back. Released instances are reset
//! through the schema, so a recycled instance is indistinguishable from a
//! freshly constructed one. This keeps steady-state attach/detach traffic
//! free of per-operation allocation.
//!
//! A component type can opt out of pooling at registration
//! ([`PoolOption::Disabled`]); the pool then degrades to pure accounting and
//! constructs a new instance on every acquire.

use super::{Id, Instance, Schema};

/// Pooling choice made when registering a component type.
#[derive(Default)]
pub enum PoolOption {
    /// Pool instances with the default growth policy.
    #[default]
    Default,
    /// Do not pool; construct on every acquire.
    Disabled,
    /// Install a pre-configured pool, e.g. one sized up front.
    Custom(Pool),
}

/// A free list of ready component instances for one component type.
///
/// When the free list runs dry, [`acquire`](Self::acquire) grows it by
/// roughly 20% of the pool's current size, and always by at least one.
pub struct Pool {
    free: Vec<Instance>,
    total: usize,
    used: usize,
    initial: usize,
    dummy: bool,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// An empty pool with the default growth policy.
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            total: 0,
            used: 0,
            initial: 0,
            dummy: false,
        }
    }

    /// A pool that pre-constructs `initial` instances when installed in the
    /// registry.
    pub fn with_initial(initial: usize) -> Self {
        Self {
            initial,
            ..Self::new()
        }
    }

    /// The accounting-only variant used when pooling is disabled.
    pub(crate) fn dummy() -> Self {
        Self {
            dummy: true,
            ..Self::new()
        }
    }

    /// Called by the registry once the schema is known.
    pub(crate) fn install(&mut self, schema: &Schema, type_id: Id) {
        if self.initial > 0 && !self.dummy {
            self.expand(self.initial, schema, type_id);
        }
    }

    /// Construct `count` fresh instances into the free list.
    pub fn expand(&mut self, count: usize, schema: &Schema, type_id: Id) {
        self.free.reserve(count);
        for _ in 0..count {
            self.free.push(schema.instantiate(type_id));
        }
        self.total += count;
    }

    /// Take a ready instance, growing the free list if it is empty.
    pub fn acquire(&mut self, schema: &Schema, type_id: Id) -> Instance {
        if self.dummy {
            self.used += 1;
            return schema.instantiate(type_id);
        }
        if self.free.is_empty() {
            // Grow by ceil(20%) of current size, at least one.
            let growth = self.total.div_ceil(5) + 1;
            self.expand(growth, schema, type_id);
        }
        self.used += 1;
        self.free.pop().expect("pool grew but has no free instance")
    }

    /// Reset an instance and return it to the free list.
    pub fn release(&mut self, schema: &Schema, mut instance: Instance) {
        self.used = self.used.saturating_sub(1);
        if self.dummy {
            return;
        }
        schema.reset(&mut instance);
        self.free.push(instance);
    }

    /// Instances constructed by this pool. For an unpooled type this tracks
    /// the in-flight count.
    #[inline]
    pub fn total(&self) -> usize {
        if self.dummy { self.used } else { self.total }
    }

    /// Instances currently ready for acquisition, or `None` when pooling is
    /// disabled (an unpooled type can always construct more).
    #[inline]
    pub fn free(&self) -> Option<usize> {
        if self.dummy { None } else { Some(self.free.len()) }
    }

    /// Instances currently held by entities, attached or pending removal.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::field::{self, Value};

    fn schema() -> Schema {
        Schema::builder()
            .field("hits", field::number(), Some(Value::from(7)))
            .field("trail", field::array(), Some(Value::from(vec![1, 2])))
            .finish()
    }

    #[test]
    fn acquire_grows_empty_pool() {
        // Given
        let schema = schema();
        let mut pool = Pool::new();

        // When
        let instance = pool.acquire(&schema, Id::new(0));

        // Then - Grew by at least one, handed one out
        assert_eq!(instance.values()[0], Value::from(7));
        assert_eq!(pool.used(), 1);
        assert!(pool.total() >= 1);
    }

    #[test]
    fn growth_is_about_twenty_percent() {
        // Given
        let schema = schema();
        let mut pool = Pool::new();
        pool.expand(20, &schema, Id::new(0));

        // When - Drain the free list, then acquire once more
        let mut held = Vec::new();
        for _ in 0..20 {
            held.push(pool.acquire(&schema, Id::new(0)));
        }
        held.push(pool.acquire(&schema, Id::new(0)));

        // Then - 20 + ceil(0.2 * 20) + 1
        assert_eq!(pool.total(), 25);
        assert_eq!(pool.used(), 21);
        assert_eq!(pool.free(), Some(4));
    }

    #[test]
    fn release_resets_instances() {
        // Given
        let schema = schema();
        let mut pool = Pool::new();
        let mut instance = pool.acquire(&schema, Id::new(0));
        instance.values_mut()[0] = Value::from(99);
        instance.values_mut()[1].as_array_mut().unwrap().clear();

        // When
        pool.release(&schema, instance);
        let recycled = pool.acquire(&schema, Id::new(0));

        // Then - Indistinguishable from a fresh instance
        assert_eq!(recycled.values()[0], Value::from(7));
        assert_eq!(recycled.values()[1], Value::from(vec![1, 2]));
    }

    #[test]
    fn preallocated_pool_expands_on_install() {
        // Given
        let schema = schema();
        let mut pool = Pool::with_initial(12);

        // When
        pool.install(&schema, Id::new(0));

        // Then
        assert_eq!(pool.total(), 12);
        assert_eq!(pool.free(), Some(12));
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn dummy_pool_only_accounts() {
        // Given
        let schema = schema();
        let mut pool = Pool::dummy();

        // When
        let a = pool.acquire(&schema, Id::new(0));
        let _b = pool.acquire(&schema, Id::new(0));
        pool.release(&schema, a);

        // Then - Counts in-flight instances, free capacity unbounded
        assert_eq!(pool.used(), 1);
        assert_eq!(pool.total(), 1);
        assert_eq!(pool.free(), None);
    }
}

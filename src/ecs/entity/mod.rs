//! Entity identity for the ECS.
//!
//! An [`Entity`] is a lightweight handle: a slot [`Id`] into the store's
//! record arena plus a [`Generation`] counting how many times that slot has
//! been recycled. The store increments a record's generation when it reclaims
//! the record, so handles held past an entity's removal stop resolving
//! instead of aliasing the slot's next occupant.
//!
//! The handle is distinct from the entity's public numeric id: that one is
//! monotonic for the world's lifetime and never reused, and lives on the
//! record (see [`Store::public_id`](store::Store::public_id)).

pub mod reference;
pub mod store;

pub use reference::{Ref, RefMut};
pub use store::Store;

/// The generation of an entity slot. Starts at `FIRST` and is incremented
/// each time the slot's record is reclaimed for a new entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The first generation of a slot.
    pub(crate) const FIRST: Self = Self(0);

    /// Get the next generation from the current.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// An entity slot identifier inside the store's record arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl From<u32> for Id {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A handle to an entity in the store.
///
/// Uniquely identifies one entity for the world's lifetime: the slot `id`
/// may be recycled, but only with a bumped `generation`, so stale handles
/// fail to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    /// The slot of the entity's record.
    id: Id,

    /// The generation the slot had when this entity was created.
    generation: Generation,
}

impl Entity {
    /// Construct an entity handle with the first generation.
    ///
    /// This is primarily used for testing.
    #[inline]
    pub(crate) fn new(id: impl Into<Id>) -> Self {
        Self::new_with_generation(id.into(), Generation::FIRST)
    }

    /// Construct an entity handle from a slot and a known generation.
    #[inline]
    pub(crate) const fn new_with_generation(id: Id, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Get the slot id of this entity.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the generation of this entity.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Get the index of this entity's record in the store arena.
    #[inline]
    pub fn index(&self) -> usize {
        self.id.0 as usize
    }
}

/// Implement ordering for Entity based on slot and generation.
impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Implement ordering for Entity based on slot and generation.
impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.id.cmp(&other.id) {
            std::cmp::Ordering::Equal => self.generation.cmp(&other.generation),
            ord => ord,
        }
    }
}

#[test]
fn entity_ordering() {
    // Given
    let e1 = Entity::new(1u32);
    let e2 = Entity::new(2u32);
    let e1_gen1 = Entity::new_with_generation(e1.id, e1.generation.next());

    // Then - Ordered by slot first, then generation
    assert!(e1 < e2);
    assert!(e1 < e1_gen1);
    assert!(e1_gen1 < e2);
}

#[test]
fn entity_equality() {
    // Given
    let e1 = Entity::new(42u32);
    let e2 = Entity::new(42u32);
    let e3 = Entity::new(43u32);
    let e1_gen1 = Entity::new_with_generation(e1.id, e1.generation.next());

    // Then
    assert_eq!(e1, e2);
    assert_ne!(e1, e3);
    assert_ne!(e1, e1_gen1); // Different generation
}

#[test]
fn generation_next() {
    // Given
    let gen0 = Generation::FIRST;

    // When
    let gen1 = gen0.next();
    let gen2 = gen1.next();

    // Then
    assert_eq!(gen0.0, 0);
    assert_eq!(gen1.0, 1);
    assert_eq!(gen2.0, 2);
}

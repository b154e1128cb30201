//! A reactive Entity-Component-System runtime.
//!
//! Simulation state lives in a [`World`](ecs::world::World): entities are
//! pooled identities, components are schema-driven data records drawn from
//! per-type object pools, and systems are processors bound to declarative
//! queries. Queries stay consistent with entity state incrementally, can
//! collect `added`/`removed`/`changed` events for the systems listening to
//! them, and component/entity removal is deferred to an end-of-tick barrier
//! so every system in a tick can still read the last state of what was
//! removed.
//!
//! ```rust,ignore
//! use reflex_ecs::component;
//! use reflex_ecs::ecs::world::World;
//!
//! component! {
//!     pub struct Position {
//!         x: number,
//!         y: number,
//!     }
//! }
//!
//! let mut world = World::new();
//! world.register_component::<Position>(Default::default());
//! let entity = world.spawn();
//! world.entity_mut(entity).unwrap().add::<Position>();
//! world.execute();
//! ```

pub mod ecs;

//! Event plumbing for reactive queries and world observability.
//!
//! # Architecture
//!
//! - **[`Log`] / [`Cursor`]**: an append-only event sequence with absolute
//!   positions. Reactive queries record membership deltas and change
//!   announcements into logs; each system holds a cursor per log and observes
//!   only the suffix written since its last clear. Clearing a system's
//!   reactive buffers is just advancing its cursors, and the scheduler
//!   compacts each log down to the earliest outstanding cursor at the end of
//!   the tick, so logs never grow past one system-lag of events.
//!
//! - **[`Emitter`] / [`WorldEvent`]**: the world-level observability hook.
//!   Listeners are an ordered list invoked synchronously in arrival order,
//!   with no isolation between callbacks. The emitter also keeps cumulative
//!   counters surfaced through world stats.

use crate::ecs::{component, entity::Entity};

/// An absolute position in a [`Log`]. Position zero is the log's first event
/// ever, independent of compaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(u64);

/// An append-only event sequence with stable positions.
///
/// Events before the earliest outstanding cursor can be dropped via
/// [`compact_to`](Self::compact_to); positions remain valid because they are
/// absolute.
pub struct Log<T> {
    /// Absolute position of `events[0]`.
    base: u64,
    events: Vec<T>,
}

impl<T> Default for Log<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Log<T> {
    /// An empty log.
    pub fn new() -> Self {
        Self {
            base: 0,
            events: Vec::new(),
        }
    }

    /// Append an event.
    #[inline]
    pub fn push(&mut self, event: T) {
        self.events.push(event);
    }

    /// The position one past the latest event. A cursor at the head observes
    /// nothing until more events arrive.
    #[inline]
    pub fn head(&self) -> Cursor {
        Cursor(self.base + self.events.len() as u64)
    }

    /// The events at or after `cursor`, oldest first.
    pub fn since(&self, cursor: Cursor) -> &[T] {
        let from = cursor.0.max(self.base) - self.base;
        let from = (from as usize).min(self.events.len());
        &self.events[from..]
    }

    /// Drop events before `cursor`. Cursors at or after `cursor` stay valid.
    pub fn compact_to(&mut self, cursor: Cursor) {
        let keep_from = cursor.0.max(self.base);
        let drop = ((keep_from - self.base) as usize).min(self.events.len());
        if drop > 0 {
            self.events.drain(..drop);
            self.base += drop as u64;
        }
    }

    /// Number of retained events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are retained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A lifecycle event observable at the world level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    /// An entity was created.
    EntityCreated(Entity),
    /// An entity was logically removed (fired once, after its removable
    /// components detached).
    EntityRemoved(Entity),
    /// A component was attached to an entity.
    ComponentAdded(Entity, component::Id),
    /// A component detach was requested on an entity. Fired at detach time
    /// for both immediate and deferred removals.
    ComponentRemoved(Entity, component::Id),
}

/// Cumulative world event counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub entity_created: u64,
    pub entity_removed: u64,
    pub component_added: u64,
    pub component_removed: u64,
}

/// The world-level event emitter: an ordered listener list plus counters.
///
/// Dispatch is synchronous and in registration order. Listeners receive the
/// event by reference and cannot reach back into the world.
#[derive(Default)]
pub struct Emitter {
    listeners: Vec<Box<dyn FnMut(&WorldEvent)>>,
    counters: Counters,
}

impl Emitter {
    /// An emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Listeners are never removed for the world's
    /// lifetime.
    pub fn observe(&mut self, listener: impl FnMut(&WorldEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Count and dispatch an event to every listener, in order.
    pub fn emit(&mut self, event: WorldEvent) {
        match event {
            WorldEvent::EntityCreated(_) => self.counters.entity_created += 1,
            WorldEvent::EntityRemoved(_) => self.counters.entity_removed += 1,
            WorldEvent::ComponentAdded(..) => self.counters.component_added += 1,
            WorldEvent::ComponentRemoved(..) => self.counters.component_removed += 1,
        }
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Cumulative counts since world creation.
    #[inline]
    pub fn counters(&self) -> Counters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn cursors_observe_only_new_events() {
        // Given
        let mut log = Log::new();
        log.push(1);
        log.push(2);

        // When
        let cursor = log.head();
        log.push(3);
        log.push(4);

        // Then
        assert_eq!(log.since(cursor), &[3, 4]);
        assert_eq!(log.since(log.head()), &[] as &[i32]);
        assert_eq!(log.since(Cursor::default()), &[1, 2, 3, 4]);
    }

    #[test]
    fn compaction_keeps_cursor_positions_stable() {
        // Given
        let mut log = Log::new();
        for i in 0..10 {
            log.push(i);
        }
        let cursor = log.head();
        log.push(10);
        log.push(11);

        // When - Drop everything the cursor has already consumed
        log.compact_to(cursor);

        // Then
        assert_eq!(log.len(), 2);
        assert_eq!(log.since(cursor), &[10, 11]);

        // When - A stale cursor from before the compacted range
        let stale = Cursor(3);

        // Then - Clamped to the retained suffix
        assert_eq!(log.since(stale), &[10, 11]);
    }

    #[test]
    fn emitter_counts_and_dispatches_in_order() {
        // Given
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter = Emitter::new();
        let first = Rc::clone(&seen);
        emitter.observe(move |event| first.borrow_mut().push((1, *event)));
        let second = Rc::clone(&seen);
        emitter.observe(move |event| second.borrow_mut().push((2, *event)));

        // When
        let entity = Entity::new(0u32);
        emitter.emit(WorldEvent::EntityCreated(entity));
        emitter.emit(WorldEvent::ComponentAdded(entity, component::Id::new(0)));

        // Then
        let counters = emitter.counters();
        assert_eq!(counters.entity_created, 1);
        assert_eq!(counters.component_added, 1);
        assert_eq!(counters.entity_removed, 0);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
    }
}

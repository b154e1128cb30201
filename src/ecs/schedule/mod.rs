//! The per-tick scheduler: system registration, ordering, and execution.
//!
//! The [`Scheduler`] owns every registered system and drives one tick at a
//! time. Systems execute in a stable order: ascending priority, then
//! registration order within a priority. Each executed system observes its
//! queries as a snapshot taken immediately before its `execute` runs, and
//! its reactive buffers are cleared immediately after (implemented as
//! advancing the system's event cursors past everything written so far,
//! including events the system itself produced).
//!
//! After the last system of a tick the scheduler runs the store's
//! deferred-removal barrier, resets the per-tick change dedup, and compacts
//! each reactive query's logs down to the earliest cursor still outstanding,
//! so a disabled system bounds log growth only by the events it has not yet
//! consumed.

use std::any::{Any, TypeId, type_name};
use std::time::{Duration, Instant};

use crate::ecs::{
    component::Registry,
    entity::Store,
    event::{Cursor, Emitter},
    query,
    system::{Attributes, Queries, System},
    world::Frame,
};

/// One registered system's scheduling state.
struct Entry {
    system: Box<dyn System>,
    type_id: TypeId,
    name: &'static str,
    priority: i32,
    /// Registration index; the tie-break within a priority.
    order: usize,
    enabled: bool,
    initialized: bool,
    /// False for listener-only systems, which never enter the execution list.
    executable: bool,
    exec_time: Duration,
    bindings: Vec<Binding>,
}

/// A system's handle on one of its declared queries.
struct Binding {
    name: &'static str,
    query: query::Id,
    mandatory: bool,
    /// This system's own listen interests; the interned query may carry a
    /// wider union from other systems.
    listen: query::Listen,
    /// Cursor into the query's membership delta log.
    membership: Cursor,
    /// Cursor into the query's change announcement log.
    changed: Cursor,
}

impl Entry {
    fn can_execute(&self, queries: &query::Index) -> bool {
        self.bindings
            .iter()
            .filter(|binding| binding.mandatory)
            .all(|binding| !queries.query(binding.query).entities().is_empty())
    }
}

/// Keep the trailing type name; the registration path is noise in stats.
fn short_type_name(full: &'static str) -> &'static str {
    full.rsplit("::").next().unwrap_or(full)
}

/// Holds the registered systems and executes one tick at a time.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
    /// Indices into `entries`, sorted by (priority, order).
    execution: Vec<usize>,
    next_order: usize,
}

impl Scheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system: resolve its declared queries, call `init` once,
    /// and slot it into the execution order.
    ///
    /// Registering the same system type twice warns and is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if a declared query names an unregistered component type or
    /// includes no component type.
    pub fn register<S: System>(
        &mut self,
        registry: &Registry,
        store: &mut Store,
        queries: &mut query::Index,
        mut system: S,
        attributes: Attributes,
    ) {
        let type_id = TypeId::of::<S>();
        let name = short_type_name(type_name::<S>());
        if self.entries.iter().any(|entry| entry.type_id == type_id) {
            log::warn!("system '{name}' is already registered");
            return;
        }

        let mut bindings = Vec::new();
        for decl in system.queries() {
            let (query_id, listen) = queries.get_or_create(registry, store, &decl.descriptor);
            let (membership, changed) = queries.query(query_id).heads();
            bindings.push(Binding {
                name: decl.name,
                query: query_id,
                mandatory: decl.mandatory,
                listen,
                membership,
                changed,
            });
        }

        system.init();
        let executable = system.executes();
        self.entries.push(Entry {
            system: Box::new(system),
            type_id,
            name,
            priority: attributes.priority,
            order: self.next_order,
            enabled: true,
            initialized: true,
            executable,
            exec_time: Duration::ZERO,
            bindings,
        });
        self.next_order += 1;
        self.rebuild_execution();
    }

    /// Remove a system by type. Unknown types are a no-op. The queries it
    /// resolved stay interned.
    pub fn unregister<S: System>(&mut self) {
        let type_id = TypeId::of::<S>();
        if let Some(position) = self
            .entries
            .iter()
            .position(|entry| entry.type_id == type_id)
        {
            self.entries.remove(position);
            self.rebuild_execution();
        }
    }

    fn rebuild_execution(&mut self) {
        let mut execution: Vec<usize> = (0..self.entries.len())
            .filter(|&index| self.entries[index].executable)
            .collect();
        execution.sort_by_key(|&index| (self.entries[index].priority, self.entries[index].order));
        self.execution = execution;
    }

    /// A registered system by type.
    pub fn get<S: System>(&self) -> Option<&S> {
        let type_id = TypeId::of::<S>();
        self.entries
            .iter()
            .find(|entry| entry.type_id == type_id)
            .and_then(|entry| {
                let system: &dyn Any = entry.system.as_ref();
                system.downcast_ref::<S>()
            })
    }

    /// A registered system by type, mutably.
    pub fn get_mut<S: System>(&mut self) -> Option<&mut S> {
        let type_id = TypeId::of::<S>();
        self.entries
            .iter_mut()
            .find(|entry| entry.type_id == type_id)
            .and_then(|entry| {
                let system: &mut dyn Any = entry.system.as_mut();
                system.downcast_mut::<S>()
            })
    }

    /// Number of registered systems, listener-only ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no systems are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enable a system and call its `play` hook.
    pub fn play<S: System>(&mut self) {
        let type_id = TypeId::of::<S>();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.type_id == type_id)
        {
            entry.enabled = true;
            entry.system.play();
        }
    }

    /// Disable a system from the next tick onward and call its `stop` hook.
    pub fn stop<S: System>(&mut self) {
        let type_id = TypeId::of::<S>();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.type_id == type_id)
        {
            entry.enabled = false;
            entry.system.stop();
        }
    }

    /// Enable every system, with `play` hooks.
    pub fn play_all(&mut self) {
        for entry in &mut self.entries {
            entry.enabled = true;
            entry.system.play();
        }
    }

    /// Disable every system, with `stop` hooks.
    pub fn stop_all(&mut self) {
        for entry in &mut self.entries {
            entry.enabled = false;
            entry.system.stop();
        }
    }

    /// Execute one tick.
    ///
    /// For each enabled system in execution order: check its mandatory
    /// queries, snapshot its query views, run it with timing, then clear its
    /// reactive buffers. Gated systems record zero execution time. After the
    /// last system the deferred-removal barrier runs and reactive logs are
    /// compacted.
    pub fn run(
        &mut self,
        registry: &Registry,
        store: &mut Store,
        queries: &mut query::Index,
        events: &mut Emitter,
        delta: f32,
        time: f64,
    ) {
        let execution = self.execution.clone();
        for index in execution {
            let entry = &mut self.entries[index];
            if !entry.enabled || !entry.initialized {
                continue;
            }
            if !entry.can_execute(queries) {
                entry.exec_time = Duration::ZERO;
                continue;
            }

            let views = entry
                .bindings
                .iter()
                .map(|binding| {
                    let view = queries.query(binding.query).view(
                        binding.membership,
                        binding.changed,
                        &binding.listen,
                    );
                    (binding.name, view)
                })
                .collect();
            let snapshot = Queries::new(views);

            let started = Instant::now();
            let mut frame = Frame::new(registry, store, queries, events);
            entry.system.execute(&snapshot, &mut frame, delta, time);
            entry.exec_time = started.elapsed();

            // Clear this system's reactive buffers: jump its cursors past
            // everything written so far, its own events included.
            for binding in &mut entry.bindings {
                let (membership, changed) = queries.query(binding.query).heads();
                binding.membership = membership;
                binding.changed = changed;
            }
        }

        store.process_deferred_removal(registry, queries, events);
        queries.end_tick();
        self.compact_logs(queries);
    }

    /// Drop every log prefix all cursors have moved past.
    fn compact_logs(&self, queries: &mut query::Index) {
        for position in 0..queries.len() {
            let id = query::Id::new(position as u32);
            let mut membership: Option<Cursor> = None;
            let mut changed: Option<Cursor> = None;
            for entry in &self.entries {
                for binding in &entry.bindings {
                    if binding.query != id {
                        continue;
                    }
                    membership = Some(match membership {
                        Some(cursor) => cursor.min(binding.membership),
                        None => binding.membership,
                    });
                    changed = Some(match changed {
                        Some(cursor) => cursor.min(binding.changed),
                        None => binding.changed,
                    });
                }
            }
            queries.compact(id, membership, changed);
        }
    }

    /// Per-system execution stats, in registration order.
    pub fn stats(&self) -> Vec<SystemStats> {
        self.entries
            .iter()
            .map(|entry| SystemStats {
                name: entry.name,
                priority: entry.priority,
                enabled: entry.enabled,
                executable: entry.executable,
                exec_time: entry.exec_time,
            })
            .collect()
    }
}

/// Snapshot of one system for stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStats {
    /// The system's type name.
    pub name: &'static str,
    /// Execution priority.
    pub priority: i32,
    /// Whether the system runs next tick.
    pub enabled: bool,
    /// Whether the system is in the execution list at all.
    pub executable: bool,
    /// Measured duration of the last execution; zero when the system was
    /// gated or skipped.
    pub exec_time: Duration,
}

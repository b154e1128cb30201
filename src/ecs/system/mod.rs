//! System declaration: the processor trait and its query bindings.
//!
//! A system is a stateful processor registered with the
//! [`Scheduler`](crate::ecs::schedule::Scheduler). It declares the queries it
//! reads up front; the scheduler resolves them against the world at
//! registration time and hands the system an owned [`Queries`] snapshot at
//! every execution, alongside a [`Frame`] for mutating the world.
//!
//! ```rust,ignore
//! struct Movement;
//!
//! impl System for Movement {
//!     fn queries(&self) -> Vec<QueryDecl> {
//!         vec![QueryDecl::new(
//!             "moving",
//!             Descriptor::new([with::<Position>(), with::<Velocity>()]),
//!         )]
//!     }
//!
//!     fn execute(&mut self, queries: &Queries, frame: &mut Frame<'_>, delta: f32, _time: f64) {
//!         for entity in &queries.get("moving").entities {
//!             // ...
//!         }
//!     }
//! }
//! ```

use std::any::Any;

use crate::ecs::{query, world::Frame};

/// One declared query of a system: a logical name, the descriptor, and
/// whether a non-empty result gates the system's execution.
#[derive(Debug, Clone)]
pub struct QueryDecl {
    /// The name the system uses to fetch this query's results.
    pub name: &'static str,
    /// The query predicate and listen interests.
    pub descriptor: query::Descriptor,
    /// When true, the system only runs while this query matches something.
    pub mandatory: bool,
}

impl QueryDecl {
    /// Declare a query under a logical name.
    pub fn new(name: &'static str, descriptor: query::Descriptor) -> Self {
        Self {
            name,
            descriptor,
            mandatory: false,
        }
    }

    /// Gate the system's execution on this query being non-empty.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Registration attributes for a system.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attributes {
    /// Execution priority; lower runs earlier. Ties execute in registration
    /// order.
    pub priority: i32,
}

impl Attributes {
    /// Attributes with the given priority.
    pub fn with_priority(priority: i32) -> Self {
        Self { priority }
    }
}

/// The named query snapshots handed to a system at its observation point.
pub struct Queries {
    views: Vec<(&'static str, query::View)>,
}

impl Queries {
    pub(crate) fn new(views: Vec<(&'static str, query::View)>) -> Self {
        Self { views }
    }

    /// The snapshot of a declared query, if declared.
    pub fn try_get(&self, name: &str) -> Option<&query::View> {
        self.views
            .iter()
            .find(|(declared, _)| *declared == name)
            .map(|(_, view)| view)
    }

    /// The snapshot of a declared query.
    ///
    /// # Panics
    ///
    /// Panics if the system declared no query under this name.
    pub fn get(&self, name: &str) -> &query::View {
        self.try_get(name)
            .unwrap_or_else(|| panic!("system declared no query named '{name}'"))
    }

    /// Iterate the declared snapshots in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &query::View)> {
        self.views.iter().map(|(name, view)| (*name, view))
    }
}

/// A processor over query results.
///
/// Systems run to completion in scheduler order, observe their queries as a
/// snapshot taken just before execution, and may mutate the world through
/// the frame. The `Any` supertrait enables typed retrieval through
/// [`Scheduler::get`](crate::ecs::schedule::Scheduler::get).
pub trait System: Any {
    /// The queries this system reads, resolved once at registration.
    fn queries(&self) -> Vec<QueryDecl> {
        Vec::new()
    }

    /// Called once when the system is registered.
    fn init(&mut self) {}

    /// Process one tick.
    fn execute(&mut self, queries: &Queries, frame: &mut Frame<'_>, delta: f32, time: f64);

    /// Systems that only hold queries and listeners report `false` and stay
    /// registered without entering the execution list.
    fn executes(&self) -> bool {
        true
    }

    /// Called when the system or the world resumes.
    fn play(&mut self) {}

    /// Called when the system or the world is stopped.
    fn stop(&mut self) {}
}

//! Declarative entity queries with inclusion/exclusion predicates and
//! reactive event buffers.
//!
//! A query names the component types an entity must have ([`with`]) and must
//! not have ([`not`]). The [`Index`](index::Index) interns queries by a
//! canonical key and keeps their matched entity lists up to date
//! incrementally as components attach and detach, so reading a query is O(1)
//! with respect to world size.
//!
//! # Reactive queries
//!
//! A query becomes reactive when some system declares interest in its
//! `added`, `removed`, or `changed` events. Membership changes are recorded
//! as deltas in an event [`Log`]; change announcements (a mutable component
//! view being taken) are recorded per `(entity, component)` pair at most once
//! per tick. Systems observe these logs through per-system cursors and
//! receive the result as an owned [`View`] snapshot: the net membership
//! changes over the observation window, deduplicated, with `added` and
//! `removed` guaranteed disjoint.

pub mod index;

use std::any::TypeId;

use fixedbitset::FixedBitSet;

use crate::ecs::{
    component::{self, Registry},
    entity::Entity,
    event::{Cursor, Log},
};

pub use index::Index;

/// A query identifier inside one world's query index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u32);

impl Id {
    #[inline]
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the index of this query in the index arena.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One term of a query descriptor: a component type to require or reject.
#[derive(Debug, Clone, Copy)]
pub struct Term {
    type_id: TypeId,
    type_name: &'static str,
    exclude: bool,
}

/// Require entities to have component type `C`.
pub fn with<C: component::Component>() -> Term {
    Term {
        type_id: TypeId::of::<C>(),
        type_name: C::name(),
        exclude: false,
    }
}

/// Reject entities that have component type `C`. This is the negation
/// operator of query descriptors.
pub fn not<C: component::Component>() -> Term {
    Term {
        type_id: TypeId::of::<C>(),
        type_name: C::name(),
        exclude: true,
    }
}

/// Declared interest in `changed` events.
#[derive(Debug, Clone, Default)]
enum ChangedDecl {
    /// No interest.
    #[default]
    Off,
    /// Any included component type.
    Included,
    /// A specific subset of component types.
    Types(Vec<(TypeId, &'static str)>),
}

/// A query declaration: terms plus reactive listen interests.
///
/// ```rust,ignore
/// let descriptor = Descriptor::new([with::<Position>(), not::<Frozen>()])
///     .listen_added()
///     .listen_removed();
/// ```
#[derive(Debug, Clone)]
pub struct Descriptor {
    terms: Vec<Term>,
    listen_added: bool,
    listen_removed: bool,
    listen_changed: ChangedDecl,
}

impl Descriptor {
    /// A descriptor over the given terms.
    pub fn new(terms: impl IntoIterator<Item = Term>) -> Self {
        Self {
            terms: terms.into_iter().collect(),
            listen_added: false,
            listen_removed: false,
            listen_changed: ChangedDecl::Off,
        }
    }

    /// Also collect entities added to the query's results.
    pub fn listen_added(mut self) -> Self {
        self.listen_added = true;
        self
    }

    /// Also collect entities removed from the query's results.
    pub fn listen_removed(mut self) -> Self {
        self.listen_removed = true;
        self
    }

    /// Also collect entities whose included components are mutably accessed.
    pub fn listen_changed(mut self) -> Self {
        self.listen_changed = ChangedDecl::Included;
        self
    }

    /// Like [`listen_changed`](Self::listen_changed), but restricted to
    /// mutable accesses of component type `C`.
    pub fn listen_changed_for<C: component::Component>(mut self) -> Self {
        let entry = (TypeId::of::<C>(), C::name());
        match &mut self.listen_changed {
            ChangedDecl::Included => {}
            ChangedDecl::Types(types) => types.push(entry),
            decl @ ChangedDecl::Off => *decl = ChangedDecl::Types(vec![entry]),
        }
        self
    }
}

/// Resolved listen interests, with component types bound to world ids.
#[derive(Debug, Clone, Default)]
pub(crate) struct Listen {
    pub(crate) added: bool,
    pub(crate) removed: bool,
    pub(crate) changed: ChangedFilter,
}

#[derive(Debug, Clone, Default)]
pub(crate) enum ChangedFilter {
    #[default]
    Off,
    Included,
    Types(Vec<component::Id>),
}

impl Listen {
    /// True when any reactive interest is declared.
    pub(crate) fn any(&self) -> bool {
        self.added || self.removed || !matches!(self.changed, ChangedFilter::Off)
    }

    /// Union two interest sets.
    pub(crate) fn merge(&mut self, other: &Listen) {
        self.added |= other.added;
        self.removed |= other.removed;
        self.changed = match (std::mem::take(&mut self.changed), &other.changed) {
            (ChangedFilter::Included, _) | (_, ChangedFilter::Included) => ChangedFilter::Included,
            (ChangedFilter::Off, other) => other.clone(),
            (mine, ChangedFilter::Off) => mine,
            (ChangedFilter::Types(mut mine), ChangedFilter::Types(theirs)) => {
                for id in theirs {
                    if !mine.contains(id) {
                        mine.push(*id);
                    }
                }
                ChangedFilter::Types(mine)
            }
        };
    }
}

/// A resolved query predicate: sorted included and excluded component ids
/// plus bitset masks for fast matching.
#[derive(Debug, Clone)]
pub struct Filter {
    include_ids: Vec<component::Id>,
    exclude_ids: Vec<component::Id>,
    include: FixedBitSet,
    exclude: FixedBitSet,
}

impl Filter {
    /// Resolve a descriptor's terms and interests against the registry.
    ///
    /// # Panics
    ///
    /// Panics if a term names an unregistered component type, or if the
    /// descriptor includes no component type at all.
    pub(crate) fn resolve(descriptor: &Descriptor, registry: &Registry) -> (Filter, Listen) {
        let mut include_ids = Vec::new();
        let mut exclude_ids = Vec::new();
        for term in &descriptor.terms {
            let id = registry.id_by_type(term.type_id).unwrap_or_else(|| {
                panic!(
                    "component type '{}' is not registered in this world",
                    term.type_name
                )
            });
            if term.exclude {
                exclude_ids.push(id);
            } else {
                include_ids.push(id);
            }
        }
        if include_ids.is_empty() {
            panic!("query must include at least one component type");
        }
        include_ids.sort_unstable();
        include_ids.dedup();
        exclude_ids.sort_unstable();
        exclude_ids.dedup();

        let bits = registry.len();
        let mut include = FixedBitSet::with_capacity(bits);
        for id in &include_ids {
            include.insert(id.index());
        }
        let mut exclude = FixedBitSet::with_capacity(bits);
        for id in &exclude_ids {
            exclude.insert(id.index());
        }

        let changed = match &descriptor.listen_changed {
            ChangedDecl::Off => ChangedFilter::Off,
            ChangedDecl::Included => ChangedFilter::Included,
            ChangedDecl::Types(types) => ChangedFilter::Types(
                types
                    .iter()
                    .map(|(type_id, name)| {
                        registry.id_by_type(*type_id).unwrap_or_else(|| {
                            panic!("component type '{name}' is not registered in this world")
                        })
                    })
                    .collect(),
            ),
        };

        (
            Filter {
                include_ids,
                exclude_ids,
                include,
                exclude,
            },
            Listen {
                added: descriptor.listen_added,
                removed: descriptor.listen_removed,
                changed,
            },
        )
    }

    /// The canonical key of this predicate: sorted included ids, then sorted
    /// excluded ids marked with `!`. Stable only within one world, since it
    /// is built from this world's id assignment.
    pub fn key(&self) -> String {
        let mut parts: Vec<String> = self
            .include_ids
            .iter()
            .map(|id| id.index().to_string())
            .collect();
        parts.extend(self.exclude_ids.iter().map(|id| format!("!{}", id.index())));
        parts.join("-")
    }

    /// True when an entity with the given attached mask matches.
    #[inline]
    pub fn matches(&self, mask: &FixedBitSet) -> bool {
        self.include.is_subset(mask) && self.exclude.is_disjoint(mask)
    }

    /// True when the given type is one of the included types.
    #[inline]
    pub fn includes(&self, id: component::Id) -> bool {
        self.include.contains(id.index())
    }

    /// True when the given type is one of the excluded types.
    #[inline]
    pub fn excludes(&self, id: component::Id) -> bool {
        self.exclude.contains(id.index())
    }
}

/// A membership delta recorded by a reactive query.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Delta {
    Added(Entity),
    Removed(Entity),
}

/// One interned query: its predicate, matched entities, and reactive logs.
pub struct Query {
    filter: Filter,
    key: String,
    entities: Vec<Entity>,
    listen: Listen,
    /// Membership deltas, recorded when any membership interest is declared.
    membership: Log<Delta>,
    /// Change announcements, one per (entity, component) per tick.
    changed: Log<(Entity, component::Id)>,
    /// Per-tick emission dedup for change announcements.
    changed_seen: Vec<(Entity, component::Id)>,
}

impl Query {
    pub(crate) fn new(filter: Filter, listen: Listen) -> Self {
        let key = filter.key();
        Self {
            filter,
            key,
            entities: Vec::new(),
            listen,
            membership: Log::new(),
            changed: Log::new(),
            changed_seen: Vec::new(),
        }
    }

    /// The entities currently matching this query.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The canonical key of this query.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The resolved predicate.
    #[inline]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// True when some system listens to this query's events.
    #[inline]
    pub fn reactive(&self) -> bool {
        self.listen.any()
    }

    pub(crate) fn merge_listen(&mut self, other: &Listen) {
        self.listen.merge(other);
    }

    fn track_membership(&self) -> bool {
        self.listen.added || self.listen.removed
    }

    /// Record a new member. Seeding passes `log = false` so pre-existing
    /// entities do not surface as `added` to the system that created the
    /// query.
    pub(crate) fn push_entity(&mut self, entity: Entity, log: bool) {
        self.entities.push(entity);
        if log && self.track_membership() {
            self.membership.push(Delta::Added(entity));
        }
    }

    /// Drop a member.
    pub(crate) fn drop_entity(&mut self, entity: Entity) {
        if let Some(position) = self.entities.iter().position(|e| *e == entity) {
            self.entities.swap_remove(position);
            if self.track_membership() {
                self.membership.push(Delta::Removed(entity));
            }
        }
    }

    /// True when this query wants change announcements for the given type.
    pub(crate) fn listens_changed(&self, id: component::Id) -> bool {
        match &self.listen.changed {
            ChangedFilter::Off => false,
            ChangedFilter::Included => self.filter.includes(id),
            ChangedFilter::Types(types) => types.contains(&id),
        }
    }

    /// Record a change announcement, at most once per (entity, component)
    /// within the current tick.
    pub(crate) fn push_changed(&mut self, entity: Entity, id: component::Id) {
        if self.changed_seen.contains(&(entity, id)) {
            return;
        }
        self.changed_seen.push((entity, id));
        self.changed.push((entity, id));
    }

    /// Reset the per-tick change dedup.
    pub(crate) fn end_tick(&mut self) {
        self.changed_seen.clear();
    }

    /// Current log heads, used to initialize and clear system cursors.
    pub(crate) fn heads(&self) -> (Cursor, Cursor) {
        (self.membership.head(), self.changed.head())
    }

    /// Drop log prefixes every outstanding cursor has consumed.
    pub(crate) fn compact(&mut self, membership: Cursor, changed: Cursor) {
        self.membership.compact_to(membership);
        self.changed.compact_to(changed);
    }

    /// Build the observation snapshot for one system.
    ///
    /// Membership deltas since the cursor are folded into net `added` and
    /// `removed` lists: an add and a remove of the same entity within the
    /// window cancel out, which keeps the two lists disjoint. The `expose`
    /// interests narrow the result to what the observing system declared.
    pub(crate) fn view(&self, membership: Cursor, changed: Cursor, expose: &Listen) -> View {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for delta in self.membership.since(membership) {
            match *delta {
                Delta::Added(entity) => {
                    if let Some(position) = removed.iter().position(|e| *e == entity) {
                        removed.remove(position);
                    } else if !added.contains(&entity) {
                        added.push(entity);
                    }
                }
                Delta::Removed(entity) => {
                    if let Some(position) = added.iter().position(|e| *e == entity) {
                        added.remove(position);
                    } else if !removed.contains(&entity) {
                        removed.push(entity);
                    }
                }
            }
        }
        if !expose.added {
            added.clear();
        }
        if !expose.removed {
            removed.clear();
        }

        let mut changed_entities = Vec::new();
        for (entity, id) in self.changed.since(changed) {
            let wanted = match &expose.changed {
                ChangedFilter::Off => false,
                ChangedFilter::Included => self.filter.includes(*id),
                ChangedFilter::Types(types) => types.contains(id),
            };
            if wanted && !changed_entities.contains(entity) {
                changed_entities.push(*entity);
            }
        }

        View {
            entities: self.entities.clone(),
            added,
            removed,
            changed: changed_entities,
        }
    }
}

/// An owned observation snapshot of one query, handed to a system at its
/// observation point.
#[derive(Debug, Clone, Default)]
pub struct View {
    /// The entities matching the query at the observation point.
    pub entities: Vec<Entity>,
    /// Entities that entered the results since the system's last clear.
    pub added: Vec<Entity>,
    /// Entities that left the results since the system's last clear.
    pub removed: Vec<Entity>,
    /// Entities whose listened components were mutably accessed since the
    /// system's last clear.
    pub changed: Vec<Entity>,
}

impl View {
    /// True when no entities match.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of matching entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Iterate the matching entities.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listen_all() -> Listen {
        Listen {
            added: true,
            removed: true,
            changed: ChangedFilter::Included,
        }
    }

    fn filter_over(include: &[u32], exclude: &[u32]) -> Filter {
        let mut include_bits = FixedBitSet::with_capacity(8);
        for &id in include {
            include_bits.insert(id as usize);
        }
        let mut exclude_bits = FixedBitSet::with_capacity(8);
        for &id in exclude {
            exclude_bits.insert(id as usize);
        }
        Filter {
            include_ids: include.iter().map(|&id| component::Id::new(id)).collect(),
            exclude_ids: exclude.iter().map(|&id| component::Id::new(id)).collect(),
            include: include_bits,
            exclude: exclude_bits,
        }
    }

    #[test]
    fn filter_matching() {
        // Given
        let filter = filter_over(&[0, 2], &[1]);
        let mut mask = FixedBitSet::with_capacity(8);
        mask.insert(0);
        mask.insert(2);

        // Then
        assert!(filter.matches(&mask));

        // When - An excluded component appears
        mask.insert(1);

        // Then
        assert!(!filter.matches(&mask));
    }

    #[test]
    fn canonical_key_marks_exclusions() {
        // Given
        let filter = filter_over(&[2, 5], &[3]);

        // Then
        assert_eq!(filter.key(), "2-5-!3");
    }

    #[test]
    fn membership_fold_cancels_within_window() {
        // Given
        let mut query = Query::new(filter_over(&[0], &[]), listen_all());
        let e1 = Entity::new(1u32);
        let e2 = Entity::new(2u32);
        let (membership, changed) = query.heads();

        // When - e1 enters and leaves inside the window, e2 only enters
        query.push_entity(e1, true);
        query.push_entity(e2, true);
        query.drop_entity(e1);

        // Then - Net changes only, disjoint lists
        let view = query.view(membership, changed, &listen_all());
        assert_eq!(view.added, vec![e2]);
        assert!(view.removed.is_empty());
        assert_eq!(view.entities, vec![e2]);
    }

    #[test]
    fn observation_windows_are_per_cursor() {
        // Given
        let mut query = Query::new(filter_over(&[0], &[]), listen_all());
        let e1 = Entity::new(1u32);
        query.push_entity(e1, true);

        // When - First window consumes the add, second window starts after
        let (m0, c0) = (Cursor::default(), Cursor::default());
        let first = query.view(m0, c0, &listen_all());
        let (m1, c1) = query.heads();
        query.drop_entity(e1);
        let second = query.view(m1, c1, &listen_all());

        // Then
        assert_eq!(first.added, vec![e1]);
        assert!(first.removed.is_empty());
        assert!(second.added.is_empty());
        assert_eq!(second.removed, vec![e1]);
    }

    #[test]
    fn changed_dedups_per_tick() {
        // Given
        let mut query = Query::new(filter_over(&[0], &[]), listen_all());
        let e1 = Entity::new(1u32);
        let comp = component::Id::new(0);
        query.push_entity(e1, false);

        // When - The same pair announced twice in one tick
        query.push_changed(e1, comp);
        query.push_changed(e1, comp);

        // Then
        let view = query.view(Cursor::default(), Cursor::default(), &listen_all());
        assert_eq!(view.changed, vec![e1]);

        // When - Next tick allows a new announcement
        query.end_tick();
        query.push_changed(e1, comp);

        // Then
        let view = query.view(Cursor::default(), Cursor::default(), &listen_all());
        assert_eq!(view.changed, vec![e1]);
        assert_eq!(query.changed.len(), 2);
    }

    #[test]
    fn seeded_entities_do_not_surface_as_added() {
        // Given
        let mut query = Query::new(filter_over(&[0], &[]), listen_all());
        let e1 = Entity::new(1u32);

        // When - Seeding does not log
        query.push_entity(e1, false);

        // Then
        let view = query.view(Cursor::default(), Cursor::default(), &listen_all());
        assert!(view.added.is_empty());
        assert_eq!(view.entities, vec![e1]);
    }

    #[test]
    fn exposure_narrows_to_declared_interests() {
        // Given
        let mut query = Query::new(filter_over(&[0], &[]), listen_all());
        let e1 = Entity::new(1u32);
        query.push_entity(e1, true);

        // When - Observer only declared removed
        let expose = Listen {
            added: false,
            removed: true,
            changed: ChangedFilter::Off,
        };
        let view = query.view(Cursor::default(), Cursor::default(), &expose);

        // Then
        assert!(view.added.is_empty());
        assert!(view.removed.is_empty());
        assert!(view.changed.is_empty());
    }

    #[test]
    fn listen_merge_unions_interests() {
        // Given
        let mut base = Listen {
            added: true,
            removed: false,
            changed: ChangedFilter::Types(vec![component::Id::new(1)]),
        };
        let other = Listen {
            added: false,
            removed: true,
            changed: ChangedFilter::Types(vec![component::Id::new(2)]),
        };

        // When
        base.merge(&other);

        // Then
        assert!(base.added && base.removed);
        match &base.changed {
            ChangedFilter::Types(types) => {
                assert_eq!(types.len(), 2);
            }
            other => panic!("expected type list, got {other:?}"),
        }
    }
}

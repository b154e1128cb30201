//! Interned query storage and incremental membership maintenance.
//!
//! The index owns every [`Query`] in the world, keyed by the canonical key of
//! its predicate. Queries live in an arena and are addressed by [`Id`];
//! entities hold back-pointer lists of the query ids that currently contain
//! them, and the index mutates both sides of that relationship together so
//! they can never drift apart.

use std::collections::HashMap;

use crate::ecs::{
    component::{self, Registry},
    entity::{Entity, Store, store::Record},
    event::Cursor,
};

use super::{Descriptor, Filter, Listen, Query};

/// The world's query index: canonical key to interned [`Query`].
#[derive(Default)]
pub struct Index {
    queries: Vec<Query>,
    by_key: HashMap<String, super::Id>,
}

impl Index {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the query for a descriptor, returning its id and
    /// the descriptor's resolved listen interests.
    ///
    /// An existing query absorbs the descriptor's listen interests. A new
    /// query seeds its results by scanning the store's current entity list
    /// once; seeded members do not surface as reactive `added` events.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor names an unregistered component type or
    /// includes no component type.
    pub(crate) fn get_or_create(
        &mut self,
        registry: &Registry,
        store: &mut Store,
        descriptor: &Descriptor,
    ) -> (super::Id, Listen) {
        let (filter, listen) = Filter::resolve(descriptor, registry);
        let key = filter.key();
        if let Some(&id) = self.by_key.get(&key) {
            self.queries[id.index()].merge_listen(&listen);
            return (id, listen);
        }

        let id = super::Id::new(self.queries.len() as u32);
        let mut query = Query::new(filter, listen.clone());
        for entity in store.live().to_vec() {
            let record = store.record_mut(entity);
            if query.filter().matches(&record.mask) {
                query.push_entity(entity, false);
                record.queries.push(id);
            }
        }
        self.by_key.insert(key, id);
        self.queries.push(query);
        (id, listen)
    }

    /// The query behind an id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not produced by this index.
    #[inline]
    pub fn query(&self, id: super::Id) -> &Query {
        &self.queries[id.index()]
    }

    /// Number of interned queries.
    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// True when no queries are interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Iterate the interned queries.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.iter()
    }

    /// A component type was attached to an entity. The record's mask has
    /// already been updated.
    pub(crate) fn on_attach(&mut self, record: &mut Record, entity: Entity, id: component::Id) {
        for (position, query) in self.queries.iter_mut().enumerate() {
            let query_id = super::Id::new(position as u32);
            let member = record.queries.contains(&query_id);
            if query.filter().excludes(id) {
                if member {
                    query.drop_entity(entity);
                    record.queries.retain(|q| *q != query_id);
                }
            } else if query.filter().includes(id)
                && !member
                && query.filter().matches(&record.mask)
            {
                query.push_entity(entity, true);
                record.queries.push(query_id);
            }
        }
    }

    /// A component type was detached from an entity (logically; the instance
    /// may linger as pending). The record's mask has already been updated.
    pub(crate) fn on_detach(&mut self, record: &mut Record, entity: Entity, id: component::Id) {
        for (position, query) in self.queries.iter_mut().enumerate() {
            let query_id = super::Id::new(position as u32);
            let member = record.queries.contains(&query_id);
            if query.filter().excludes(id) {
                if !member && query.filter().matches(&record.mask) {
                    query.push_entity(entity, true);
                    record.queries.push(query_id);
                }
            } else if query.filter().includes(id)
                && member
                && !query.filter().matches(&record.mask)
            {
                query.drop_entity(entity);
                record.queries.retain(|q| *q != query_id);
            }
        }
    }

    /// An entity left the store; strip it from every query holding it.
    pub(crate) fn on_entity_removed(&mut self, record: &mut Record, entity: Entity) {
        for query_id in record.queries.drain(..) {
            self.queries[query_id.index()].drop_entity(entity);
        }
    }

    /// A mutable component view was taken; announce the change to every
    /// reactive query over this entity that listens for this type.
    pub(crate) fn notify_changed(&mut self, record: &Record, entity: Entity, id: component::Id) {
        for query_id in &record.queries {
            let query = &mut self.queries[query_id.index()];
            if query.listens_changed(id) {
                query.push_changed(entity, id);
            }
        }
    }

    /// End-of-tick bookkeeping: reset per-tick change dedup.
    pub(crate) fn end_tick(&mut self) {
        for query in &mut self.queries {
            query.end_tick();
        }
    }

    /// Drop the log prefix of one query below the earliest outstanding
    /// cursors. `None` means no cursor is outstanding and the whole log can
    /// go.
    pub(crate) fn compact(
        &mut self,
        id: super::Id,
        membership: Option<Cursor>,
        changed: Option<Cursor>,
    ) {
        let query = &mut self.queries[id.index()];
        let (membership_head, changed_head) = query.heads();
        query.compact(
            membership.unwrap_or(membership_head),
            changed.unwrap_or(changed_head),
        );
    }

    /// Per-query match counts for stats.
    pub fn stats(&self) -> Vec<QueryStats> {
        self.queries
            .iter()
            .map(|query| QueryStats {
                key: query.key().to_owned(),
                entities: query.entities().len(),
                reactive: query.reactive(),
            })
            .collect()
    }
}

/// Snapshot of one query for stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStats {
    /// The query's canonical key.
    pub key: String,
    /// Number of currently matched entities.
    pub entities: usize,
    /// Whether any system listens to this query's events.
    pub reactive: bool,
}

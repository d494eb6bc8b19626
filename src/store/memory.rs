//! In-process store. Backs tests and `STORE=memory`.

use super::{ChangeSet, Committed, EntityStore, LinkRow, StoreError};
use crate::config::EntityDescriptor;
use crate::entity::Entity;
use crate::filter::{Predicate, QueryContext};
use crate::service::value_eq;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// `(column, id)`; a link row is stored as its two ends ordered by column name.
type LinkEnd = (String, i64);

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: HashMap<String, BTreeMap<i64, Entity>>,
    sequences: HashMap<String, i64>,
    links: HashMap<String, BTreeSet<(LinkEnd, LinkEnd)>>,
}

impl Tables {
    fn hydrate(&self, descriptor: &EntityDescriptor, mut entity: Entity) -> Entity {
        entity.relations.clear();
        let Some(id) = entity.id else { return entity };
        for r in &descriptor.relations {
            let ids = self
                .links
                .get(&r.link.table)
                .into_iter()
                .flatten()
                .filter_map(|(a, b)| {
                    [(a, b), (b, a)]
                        .into_iter()
                        .find(|(mine, other)| mine.0 == r.link.column && mine.1 == id && other.0 == r.link.target_column)
                        .map(|(_, other)| other.1)
                })
                .collect();
            entity.relations.insert(r.name.clone(), ids);
        }
        entity
    }

    fn save(&mut self, descriptor: &EntityDescriptor, mut entity: Entity) -> Result<Entity, StoreError> {
        entity.relations.clear();
        let table = self.rows.entry(descriptor.table_name.clone()).or_default();
        let id = match entity.id {
            Some(id) if table.contains_key(&id) => id,
            Some(id) => {
                return Err(StoreError::Inconsistent(format!(
                    "{} {} no longer exists",
                    descriptor.name, id
                )))
            }
            None => {
                let seq = self.sequences.entry(descriptor.table_name.clone()).or_insert(0);
                *seq += 1;
                *seq
            }
        };
        entity.id = Some(id);
        table.insert(id, entity.clone());
        Ok(entity)
    }

    fn remove(&mut self, descriptor: &EntityDescriptor, id: i64) {
        for r in &descriptor.relations {
            if let Some(rows) = self.links.get_mut(&r.link.table) {
                rows.retain(|(a, b)| !(a.0 == r.link.column && a.1 == id) && !(b.0 == r.link.column && b.1 == id));
            }
        }
        if let Some(table) = self.rows.get_mut(&descriptor.table_name) {
            table.remove(&id);
        }
    }

    fn link_key(row: &LinkRow) -> (LinkEnd, LinkEnd) {
        let a = (row.column.clone(), row.id);
        let b = (row.target_column.clone(), row.target_id);
        if a.0 <= b.0 {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Inconsistent("memory store lock poisoned".into()))
    }

    fn load(&self, descriptor: &EntityDescriptor, ids: &[i64]) -> Result<Vec<Entity>, StoreError> {
        let tables = self.lock()?;
        let Some(rows) = tables.rows.get(&descriptor.table_name) else {
            return Ok(Vec::new());
        };
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| rows.get(&id).cloned())
            .map(|e| tables.hydrate(descriptor, e))
            .collect())
    }

    fn query(&self, descriptor: &EntityDescriptor, query: &QueryContext) -> Result<Vec<Entity>, StoreError> {
        let tables = self.lock()?;
        let Some(rows) = tables.rows.get(&descriptor.table_name) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .map(|e| tables.hydrate(descriptor, e.clone()))
            .filter(|e| query.predicates().iter().all(|p| matches(descriptor, e, p)))
            .collect())
    }

    fn apply(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut guard = self.lock()?;
        // Work on a copy so a failing change leaves the store untouched.
        let mut next = guard.clone();
        let mut saved = Vec::with_capacity(changes.saves.len());
        for (descriptor, entity) in changes.saves {
            let entity = next.save(&descriptor, entity)?;
            saved.push((descriptor, entity));
        }
        for row in &changes.links {
            next.links.entry(row.table.clone()).or_default().insert(Tables::link_key(row));
        }
        for row in &changes.unlinks {
            if let Some(rows) = next.links.get_mut(&row.table) {
                rows.remove(&Tables::link_key(row));
            }
        }
        for (descriptor, entity) in &changes.removals {
            if let Some(id) = entity.id {
                next.remove(descriptor, id);
            }
        }
        *guard = next;
        Ok(Committed {
            saved: saved
                .into_iter()
                .map(|(descriptor, entity)| guard.hydrate(&descriptor, entity))
                .collect(),
        })
    }
}

fn matches(descriptor: &EntityDescriptor, entity: &Entity, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::FieldEquals { field, value } => {
            if descriptor.id_field().name == *field {
                return value.as_i64().is_some() && value.as_i64() == entity.id;
            }
            entity.value(field).map(|v| value_eq(v, value)).unwrap_or(false)
        }
        Predicate::MemberOf { relation, id } => entity.is_linked(relation, *id),
        Predicate::MatchNone => false,
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_id(&self, descriptor: &EntityDescriptor, id: i64) -> Result<Option<Entity>, StoreError> {
        Ok(self.load(descriptor, &[id])?.into_iter().next())
    }

    async fn find_many(&self, descriptor: &EntityDescriptor, ids: &[i64]) -> Result<Vec<Entity>, StoreError> {
        self.load(descriptor, ids)
    }

    async fn execute(&self, descriptor: &EntityDescriptor, query: &QueryContext) -> Result<Vec<Entity>, StoreError> {
        self.query(descriptor, query)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let committed = self.apply(changes)?;
        tracing::debug!(saved = committed.saved.len(), "memory commit");
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve, Registry};
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> Registry {
        resolve(&builtin().unwrap()).unwrap()
    }

    async fn insert(store: &MemoryStore, d: &Arc<EntityDescriptor>, name: &str) -> Entity {
        let mut changes = ChangeSet::new();
        changes.add(d.clone(), Entity::new(d.name.clone()).with_value("name", json!(name)));
        store.commit(changes).await.unwrap().saved.remove(0)
    }

    #[tokio::test]
    async fn commit_assigns_sequential_ids() {
        let registry = registry();
        let group = registry.get("group").unwrap();
        let store = MemoryStore::new();
        assert_eq!(insert(&store, group, "a").await.id, Some(1));
        assert_eq!(insert(&store, group, "b").await.id, Some(2));
    }

    #[tokio::test]
    async fn link_rows_are_visible_from_both_sides() {
        let registry = registry();
        let (user, group) = (registry.get("user").unwrap(), registry.get("group").unwrap());
        let store = MemoryStore::new();
        let u = insert(&store, user, "ann").await;
        let g = insert(&store, group, "admins").await;

        let mut changes = ChangeSet::new();
        changes.link(LinkRow::new(user.relation("groups").unwrap(), u.id.unwrap(), g.id.unwrap()));
        store.commit(changes).await.unwrap();

        let u = store.find_by_id(user, 1).await.unwrap().unwrap();
        let g = store.find_by_id(group, 1).await.unwrap().unwrap();
        assert!(u.is_linked("groups", 1));
        assert!(g.is_linked("users", 1));
    }

    #[tokio::test]
    async fn removal_drops_link_rows() {
        let registry = registry();
        let (user, group) = (registry.get("user").unwrap(), registry.get("group").unwrap());
        let store = MemoryStore::new();
        let u = insert(&store, user, "ann").await;
        let g = insert(&store, group, "admins").await;
        let mut changes = ChangeSet::new();
        changes.link(LinkRow::new(group.relation("users").unwrap(), 1, 1));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.remove(user.clone(), u);
        store.commit(changes).await.unwrap();

        assert!(store.find_by_id(user, 1).await.unwrap().is_none());
        let g = store.find_by_id(group, g.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(g.related_ids("users").count(), 0);
    }

    #[tokio::test]
    async fn failed_commit_leaves_store_untouched() {
        let registry = registry();
        let group = registry.get("group").unwrap();
        let store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.add(group.clone(), Entity::new("group").with_value("name", json!("x")));
        changes.add(group.clone(), Entity::new("group").with_id(40).with_value("name", json!("y")));
        assert!(matches!(store.commit(changes).await, Err(StoreError::Inconsistent(_))));
        assert!(store.find_all(group).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execute_applies_predicates() {
        let registry = registry();
        let group = registry.get("group").unwrap();
        let store = MemoryStore::new();
        insert(&store, group, "a").await;
        insert(&store, group, "b").await;
        let mut query = store.new_query(group);
        query.and_where(Predicate::FieldEquals {
            field: "name".into(),
            value: json!("b"),
        });
        let found = store.execute(group, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Some(2));
    }
}

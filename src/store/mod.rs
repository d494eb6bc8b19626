//! Persistence port: lookups, list queries and a one-shot unit of work.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::{EntityDescriptor, RelationDescriptor};
use crate::entity::Entity;
use crate::filter::QueryContext;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),
}

/// One row of a many-to-many link table, seen from the side that staged it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRow {
    pub table: String,
    pub column: String,
    pub id: i64,
    pub target_column: String,
    pub target_id: i64,
}

impl LinkRow {
    pub fn new(relation: &RelationDescriptor, id: i64, target_id: i64) -> Self {
        LinkRow {
            table: relation.link.table.clone(),
            column: relation.link.column.clone(),
            id,
            target_column: relation.link.target_column.clone(),
            target_id,
        }
    }
}

/// Changes staged by a single engine call, applied atomically by [`EntityStore::commit`].
///
/// Stores apply saves, then link and unlink rows, then removals.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub saves: Vec<(Arc<EntityDescriptor>, Entity)>,
    pub links: Vec<LinkRow>,
    pub unlinks: Vec<LinkRow>,
    pub removals: Vec<(Arc<EntityDescriptor>, Entity)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert when the entity has no id yet, update otherwise.
    pub fn add(&mut self, descriptor: Arc<EntityDescriptor>, entity: Entity) {
        self.saves.push((descriptor, entity));
    }

    pub fn remove(&mut self, descriptor: Arc<EntityDescriptor>, entity: Entity) {
        self.removals.push((descriptor, entity));
    }

    pub fn link(&mut self, row: LinkRow) {
        self.links.push(row);
    }

    pub fn unlink(&mut self, row: LinkRow) {
        self.unlinks.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.links.is_empty() && self.unlinks.is_empty() && self.removals.is_empty()
    }
}

/// Result of a commit: saved entities in staging order, ids assigned.
#[derive(Clone, Debug, Default)]
pub struct Committed {
    pub saved: Vec<Entity>,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load one record with its relation id sets.
    async fn find_by_id(&self, descriptor: &EntityDescriptor, id: i64) -> Result<Option<Entity>, StoreError>;

    /// Load the records among `ids` that exist, ordered by id.
    async fn find_many(&self, descriptor: &EntityDescriptor, ids: &[i64]) -> Result<Vec<Entity>, StoreError>;

    async fn find_all(&self, descriptor: &EntityDescriptor) -> Result<Vec<Entity>, StoreError> {
        let query = self.new_query(descriptor);
        self.execute(descriptor, &query).await
    }

    fn new_query(&self, descriptor: &EntityDescriptor) -> QueryContext {
        QueryContext::new(descriptor.name.clone())
    }

    /// Run a list query; results ordered by id.
    async fn execute(&self, descriptor: &EntityDescriptor, query: &QueryContext) -> Result<Vec<Entity>, StoreError>;

    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError>;

    /// Reachability probe for readiness checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

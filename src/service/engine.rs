//! Entity-agnostic CRUD orchestration over the store, validator, filters and codec.

use super::{Outcome, Validator};
use crate::codec::{self, RelatedEntities};
use crate::config::{EntitiesConfig, EntityDescriptor, Registry};
use crate::entity::{Entity, Violation};
use crate::error::ConfigError;
use crate::filter::{FilterPipeline, SearchParams};
use crate::store::{ChangeSet, EntityStore, LinkRow, StoreError};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkChange {
    Attach,
    Detach,
}

/// Runs CRUD for any registered entity type. Holds no per-call state; every
/// mutating call stages its changes and commits them exactly once.
pub struct CrudEngine {
    registry: Arc<Registry>,
    store: Arc<dyn EntityStore>,
    validator: Arc<dyn Validator>,
    filters: FilterPipeline,
}

impl CrudEngine {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn EntityStore>,
        validator: Arc<dyn Validator>,
        filters: FilterPipeline,
    ) -> Self {
        CrudEngine {
            registry,
            store,
            validator,
            filters,
        }
    }

    /// Resolve config into a registry and filter pipeline and wire them to the ports.
    pub fn from_config(
        config: &EntitiesConfig,
        store: Arc<dyn EntityStore>,
        validator: Arc<dyn Validator>,
    ) -> Result<Self, ConfigError> {
        let registry = crate::config::resolve(config)?;
        let filters = FilterPipeline::from_config(&config.filters, &registry)?;
        Ok(Self::new(Arc::new(registry), store, validator, filters))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn descriptor(&self, resource: &str) -> Result<Arc<EntityDescriptor>, Outcome> {
        self.registry
            .resolve(resource)
            .cloned()
            .ok_or_else(|| Outcome::NotFound(format!("unknown resource '{}'", resource)))
    }

    /// All records of `resource` passing the filters, encoded under `scope`.
    pub async fn list(&self, resource: &str, scope: &str, params: &SearchParams) -> Result<Outcome, StoreError> {
        let entity = match self.descriptor(resource) {
            Ok(e) => e,
            Err(outcome) => return Ok(outcome),
        };
        let mut query = self.store.new_query(&entity);
        self.filters.apply(&mut query, params);
        let records = self.store.execute(&entity, &query).await?;
        tracing::debug!(resource = %entity.name, count = records.len(), "list");
        let related = self.load_related(&entity, scope, &records).await?;
        let items = records
            .iter()
            .map(|r| codec::encode(&self.registry, &entity, r, scope, &related))
            .collect();
        Ok(Outcome::Success(Some(Value::Array(items))))
    }

    pub async fn get(&self, resource: &str, scope: &str, id: i64) -> Result<Outcome, StoreError> {
        let entity = match self.descriptor(resource) {
            Ok(e) => e,
            Err(outcome) => return Ok(outcome),
        };
        let Some(record) = self.store.find_by_id(&entity, id).await? else {
            return Ok(not_found(&entity, id));
        };
        self.encode_one(&entity, &record, scope).await
    }

    /// Decode under `write_scope`, validate, insert; respond under `read_scope`.
    pub async fn create(
        &self,
        resource: &str,
        write_scope: &str,
        read_scope: &str,
        payload: &Value,
    ) -> Result<Outcome, StoreError> {
        let entity = match self.descriptor(resource) {
            Ok(e) => e,
            Err(outcome) => return Ok(outcome),
        };
        let record = match codec::decode_new(&entity, payload, write_scope) {
            Ok(r) => r,
            Err(v) => return Ok(Outcome::ValidationFailed(vec![v])),
        };
        if let Some(outcome) = self.check(&entity, &record) {
            return Ok(outcome);
        }

        let mut changes = ChangeSet::new();
        changes.add(entity.clone(), record);
        let created = self
            .store
            .commit(changes)
            .await?
            .saved
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Inconsistent(format!("{} insert returned no record", entity.name)))?;
        tracing::info!(resource = %entity.name, id = ?created.id, "created");
        self.encode_one(&entity, &created, read_scope).await
    }

    /// Merge `payload` onto the stored record. `write_scope` of `None` accepts every data field.
    pub async fn update(
        &self,
        resource: &str,
        write_scope: Option<&str>,
        read_scope: &str,
        id: i64,
        payload: &Value,
    ) -> Result<Outcome, StoreError> {
        let entity = match self.descriptor(resource) {
            Ok(e) => e,
            Err(outcome) => return Ok(outcome),
        };
        let Some(mut record) = self.store.find_by_id(&entity, id).await? else {
            return Ok(not_found(&entity, id));
        };
        if let Err(v) = codec::decode_merge(&entity, &mut record, payload, write_scope) {
            return Ok(Outcome::ValidationFailed(vec![v]));
        }
        if let Some(outcome) = self.check(&entity, &record) {
            return Ok(outcome);
        }

        let mut changes = ChangeSet::new();
        changes.add(entity.clone(), record.clone());
        self.store.commit(changes).await?;
        tracing::info!(resource = %entity.name, id, "updated");
        self.encode_one(&entity, &record, read_scope).await
    }

    pub async fn delete(&self, resource: &str, id: i64) -> Result<Outcome, StoreError> {
        let entity = match self.descriptor(resource) {
            Ok(e) => e,
            Err(outcome) => return Ok(outcome),
        };
        let Some(record) = self.store.find_by_id(&entity, id).await? else {
            return Ok(not_found(&entity, id));
        };
        let mut changes = ChangeSet::new();
        changes.remove(entity.clone(), record);
        self.store.commit(changes).await?;
        tracing::info!(resource = %entity.name, id, "deleted");
        Ok(Outcome::Success(None))
    }

    /// Link `id` and `related_id` through `relation` on both sides; responds with `id` under `scope`.
    pub async fn attach(
        &self,
        resource: &str,
        relation: &str,
        id: i64,
        related_id: i64,
        scope: &str,
    ) -> Result<Outcome, StoreError> {
        self.change_link(resource, relation, id, related_id, scope, LinkChange::Attach)
            .await
    }

    /// Reverse of [`attach`](Self::attach); detaching an unlinked pair is a no-op.
    pub async fn detach(
        &self,
        resource: &str,
        relation: &str,
        id: i64,
        related_id: i64,
        scope: &str,
    ) -> Result<Outcome, StoreError> {
        self.change_link(resource, relation, id, related_id, scope, LinkChange::Detach)
            .await
    }

    async fn change_link(
        &self,
        resource: &str,
        relation: &str,
        id: i64,
        related_id: i64,
        scope: &str,
        change: LinkChange,
    ) -> Result<Outcome, StoreError> {
        let entity = match self.descriptor(resource) {
            Ok(e) => e,
            Err(outcome) => return Ok(outcome),
        };
        let Some(rel) = entity.relation(relation) else {
            return Ok(Outcome::NotFound(format!(
                "unknown relation '{}' on {}",
                relation, entity.name
            )));
        };
        let Some(target) = self.registry.get(&rel.target).cloned() else {
            return Ok(Outcome::NotFound(format!("unknown resource '{}'", rel.target)));
        };
        let Some(mut parent) = self.store.find_by_id(&entity, id).await? else {
            return Ok(not_found(&entity, id));
        };
        if self.store.find_by_id(&target, related_id).await?.is_none() {
            return Ok(not_found(&target, related_id));
        }

        // One link row serves both sides; the inverse relation reads it back on load.
        let row = LinkRow::new(rel, id, related_id);
        let mut changes = ChangeSet::new();
        match change {
            LinkChange::Attach => {
                if parent.link(&rel.name, related_id) {
                    changes.link(row);
                }
            }
            LinkChange::Detach => {
                if parent.unlink(&rel.name, related_id) {
                    changes.unlink(row);
                }
            }
        }
        self.store.commit(changes).await?;
        tracing::info!(
            resource = %entity.name,
            relation = %rel.name,
            id,
            related_id,
            change = ?change,
            "relation changed"
        );

        self.encode_one(&entity, &parent, scope).await
    }

    fn check(&self, entity: &EntityDescriptor, record: &Entity) -> Option<Outcome> {
        let violations: Vec<Violation> = self.validator.validate(entity, record);
        if violations.is_empty() {
            return None;
        }
        tracing::debug!(resource = %entity.name, violations = violations.len(), "validation failed");
        Some(Outcome::ValidationFailed(violations))
    }

    async fn encode_one(&self, entity: &EntityDescriptor, record: &Entity, scope: &str) -> Result<Outcome, StoreError> {
        let related = self.load_related(entity, scope, std::slice::from_ref(record)).await?;
        Ok(Outcome::Success(Some(codec::encode(
            &self.registry,
            entity,
            record,
            scope,
            &related,
        ))))
    }

    /// Batch-load every record referenced through relations visible in `scope`.
    async fn load_related(
        &self,
        entity: &EntityDescriptor,
        scope: &str,
        records: &[Entity],
    ) -> Result<RelatedEntities, StoreError> {
        let mut related = RelatedEntities::new();
        for relation in entity.relations.iter().filter(|r| r.in_scope(scope)) {
            let Some(target) = self.registry.get(&relation.target) else {
                continue;
            };
            let ids: BTreeSet<i64> = records.iter().flat_map(|r| r.related_ids(&relation.name)).collect();
            if ids.is_empty() {
                continue;
            }
            let ids: Vec<i64> = ids.into_iter().collect();
            for r in self.store.find_many(target, &ids).await? {
                related.insert(r);
            }
        }
        Ok(related)
    }
}

fn not_found(entity: &EntityDescriptor, id: i64) -> Outcome {
    Outcome::NotFound(format!("{} {} not found", entity.name, id))
}

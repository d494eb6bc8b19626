//! PostgreSQL store. Tables and link tables are expected to exist.

use super::{ChangeSet, Committed, EntityStore, StoreError};
use crate::config::{EntityDescriptor, FieldType};
use crate::entity::Entity;
use crate::filter::QueryContext;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres, Row};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    async fn fetch_entities(&self, entity: &EntityDescriptor, q: &QueryBuf) -> Result<Vec<Entity>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(q).fetch_all(&self.pool).await?;
        let mut out = rows
            .iter()
            .map(|r| row_to_entity(entity, r))
            .collect::<Result<Vec<_>, _>>()?;
        self.load_relations(entity, &mut out).await?;
        Ok(out)
    }

    /// Fill relation id sets for every loaded record, one query per relation.
    async fn load_relations(&self, entity: &EntityDescriptor, records: &mut [Entity]) -> Result<(), StoreError> {
        let ids: Vec<i64> = records.iter().filter_map(|e| e.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        for relation in &entity.relations {
            let q = sql::select_links(relation, &ids);
            tracing::debug!(sql = %q.sql, params = ?q.params, "query");
            let rows = bind_all(&q).fetch_all(&self.pool).await?;
            let mut by_owner: HashMap<i64, Vec<i64>> = HashMap::new();
            for row in &rows {
                let owner: i64 = row.try_get("id")?;
                let target: i64 = row.try_get("target_id")?;
                by_owner.entry(owner).or_default().push(target);
            }
            for record in records.iter_mut() {
                let targets = record.id.and_then(|id| by_owner.remove(&id)).unwrap_or_default();
                record.relations.insert(relation.name.clone(), targets.into_iter().collect());
            }
        }
        Ok(())
    }

    async fn apply(tx: &mut PgConnection, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut committed = Committed::default();
        for (entity, mut record) in changes.saves {
            match record.id {
                None => {
                    let q = sql::insert(&entity, &record);
                    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
                    let row = bind_all(&q).fetch_one(&mut *tx).await?;
                    record.id = Some(row.try_get(0)?);
                }
                Some(id) => {
                    let q = sql::update(&entity, &record, id);
                    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
                    let done = bind_all(&q).execute(&mut *tx).await?;
                    if done.rows_affected() == 0 {
                        return Err(StoreError::Inconsistent(format!("{} {} no longer exists", entity.name, id)));
                    }
                }
            }
            committed.saved.push(record);
        }
        for row in &changes.links {
            execute_tx(tx, &sql::insert_link(row)).await?;
        }
        for row in &changes.unlinks {
            execute_tx(tx, &sql::delete_link(row)).await?;
        }
        for (entity, record) in &changes.removals {
            let Some(id) = record.id else { continue };
            for relation in &entity.relations {
                execute_tx(tx, &sql::delete_links(relation, id)).await?;
            }
            execute_tx(tx, &sql::delete(entity, id)).await?;
        }
        Ok(committed)
    }
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

async fn execute_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<u64, StoreError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
    Ok(bind_all(q).execute(&mut *tx).await?.rows_affected())
}

fn row_to_entity(entity: &EntityDescriptor, row: &PgRow) -> Result<Entity, StoreError> {
    let mut record = Entity::new(entity.name.clone());
    for f in &entity.fields {
        let name = f.name.as_str();
        if f.identifier {
            record.id = row.try_get::<Option<i64>, _>(name)?;
            continue;
        }
        let value = match f.field_type {
            FieldType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            FieldType::Float => row
                .try_get::<Option<f64>, _>(name)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            FieldType::String => row.try_get::<Option<String>, _>(name)?.map(Value::String),
            FieldType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        };
        record.set_value(f.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find_by_id(&self, entity: &EntityDescriptor, id: i64) -> Result<Option<Entity>, StoreError> {
        let q = sql::select_by_id(entity, id);
        Ok(self.fetch_entities(entity, &q).await?.into_iter().next())
    }

    async fn find_many(&self, entity: &EntityDescriptor, ids: &[i64]) -> Result<Vec<Entity>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let q = sql::select_by_ids(entity, ids);
        self.fetch_entities(entity, &q).await
    }

    async fn execute(&self, entity: &EntityDescriptor, query: &QueryContext) -> Result<Vec<Entity>, StoreError> {
        let q = sql::select_list(entity, query);
        self.fetch_entities(entity, &q).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        if changes.is_empty() {
            return Ok(Committed::default());
        }
        let mut tx = self.pool.begin().await?;
        let committed = Self::apply(&mut *tx, changes).await?;
        tx.commit().await?;
        tracing::debug!(saved = committed.saved.len(), "transaction committed");
        Ok(committed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from entity descriptors.

use crate::config::{EntityDescriptor, FieldDescriptor, FieldType, RelationDescriptor};
use crate::entity::Entity;
use crate::filter::{Predicate, QueryContext};
use crate::store::LinkRow;
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn pg_cast(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "int8",
        FieldType::Float => "float8",
        FieldType::String => "text",
        FieldType::Boolean => "bool",
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Pushes `v` and returns its placeholder cast to the field's type.
    fn placeholder(&mut self, field_type: FieldType, v: Value) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, pg_cast(field_type))
    }

    fn id_list(&mut self, ids: &[i64]) -> String {
        ids.iter()
            .map(|&id| self.placeholder(FieldType::Integer, Value::from(id)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// SELECT list: every field cast to its wire type and aliased to its field name.
fn select_column_list(entity: &EntityDescriptor) -> String {
    entity
        .fields
        .iter()
        .map(|f| format!("{}::{} AS {}", quoted(&f.column), pg_cast(f.field_type), quoted(&f.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_column(entity: &EntityDescriptor) -> String {
    quoted(&entity.id_field().column)
}

/// SELECT by primary key.
pub fn select_by_id(entity: &EntityDescriptor, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(FieldType::Integer, Value::from(id));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(entity),
        quoted(&entity.table_name),
        id_column(entity),
        ph
    );
    q
}

/// SELECT rows whose id is in `ids`, ORDER BY id. Used for batch-loading related rows.
pub fn select_by_ids(entity: &EntityDescriptor, ids: &[i64]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table_name);
    let cols = select_column_list(entity);
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, table);
        return q;
    }
    let placeholders = q.id_list(ids);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        cols,
        table,
        id_column(entity),
        placeholders,
        id_column(entity)
    );
    q
}

/// SELECT list with the query's predicates AND-ed, ORDER BY id.
pub fn select_list(entity: &EntityDescriptor, query: &QueryContext) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_col = id_column(entity);
    let mut where_parts = Vec::new();
    for predicate in query.predicates() {
        match predicate {
            Predicate::FieldEquals { field, value } => match entity.field(field) {
                Some(f) => {
                    let ph = q.placeholder(f.field_type, value.clone());
                    where_parts.push(format!("{} = {}", quoted(&f.column), ph));
                }
                None => where_parts.push("1 = 0".to_string()),
            },
            Predicate::MemberOf { relation, id } => match entity.relation(relation) {
                Some(r) => {
                    let ph = q.placeholder(FieldType::Integer, Value::from(*id));
                    where_parts.push(format!(
                        "{} IN (SELECT {} FROM {} WHERE {} = {})",
                        id_col,
                        quoted(&r.link.column),
                        quoted(&r.link.table),
                        quoted(&r.link.target_column),
                        ph
                    ));
                }
                None => where_parts.push("1 = 0".to_string()),
            },
            Predicate::MatchNone => where_parts.push("1 = 0".to_string()),
        }
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        select_column_list(entity),
        quoted(&entity.table_name),
        where_clause,
        id_col
    );
    q
}

/// Link rows of `relation` for the owners in `ids`, as (`id`, `target_id`).
pub fn select_links(relation: &RelationDescriptor, ids: &[i64]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let placeholders = q.id_list(ids);
    q.sql = format!(
        "SELECT {}::int8 AS \"id\", {}::int8 AS \"target_id\" FROM {} WHERE {} IN ({})",
        quoted(&relation.link.column),
        quoted(&relation.link.target_column),
        quoted(&relation.link.table),
        quoted(&relation.link.column),
        placeholders
    );
    q
}

fn present_data_fields<'a>(
    entity: &'a EntityDescriptor,
    record: &'a Entity,
) -> impl Iterator<Item = (&'a FieldDescriptor, &'a Value)> + 'a {
    entity
        .data_fields()
        .filter_map(move |f| record.value(&f.name).map(|v| (f, v)))
}

/// INSERT the record's data fields, RETURNING the assigned id. Absent fields fall to the column default.
pub fn insert(entity: &EntityDescriptor, record: &Entity) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table_name);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (f, v) in present_data_fields(entity, record) {
        cols.push(quoted(&f.column));
        placeholders.push(q.placeholder(f.field_type, v.clone()));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}::int8", table, id_column(entity))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}::int8",
            table,
            cols.join(", "),
            placeholders.join(", "),
            id_column(entity)
        )
    };
    q
}

/// UPDATE by id: SET every data field the record holds.
pub fn update(entity: &EntityDescriptor, record: &Entity, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table_name);
    let mut sets = Vec::new();
    for (f, v) in present_data_fields(entity, record) {
        let ph = q.placeholder(f.field_type, v.clone());
        sets.push(format!("{} = {}", quoted(&f.column), ph));
    }
    let id_ph = q.placeholder(FieldType::Integer, Value::from(id));
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = {}", id_column(entity), table, id_column(entity), id_ph)
    } else {
        format!("UPDATE {} SET {} WHERE {} = {}", table, sets.join(", "), id_column(entity), id_ph)
    };
    q
}

/// DELETE by id.
pub fn delete(entity: &EntityDescriptor, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(FieldType::Integer, Value::from(id));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(&entity.table_name), id_column(entity), ph);
    q
}

/// DELETE every link row of `relation` owned by `id`.
pub fn delete_links(relation: &RelationDescriptor, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(FieldType::Integer, Value::from(id));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(&relation.link.table),
        quoted(&relation.link.column),
        ph
    );
    q
}

pub fn insert_link(row: &LinkRow) -> QueryBuf {
    let mut q = QueryBuf::new();
    let a = q.placeholder(FieldType::Integer, Value::from(row.id));
    let b = q.placeholder(FieldType::Integer, Value::from(row.target_id));
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT DO NOTHING",
        quoted(&row.table),
        quoted(&row.column),
        quoted(&row.target_column),
        a,
        b
    );
    q
}

pub fn delete_link(row: &LinkRow) -> QueryBuf {
    let mut q = QueryBuf::new();
    let a = q.placeholder(FieldType::Integer, Value::from(row.id));
    let b = q.placeholder(FieldType::Integer, Value::from(row.target_id));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} AND {} = {}",
        quoted(&row.table),
        quoted(&row.column),
        a,
        quoted(&row.target_column),
        b
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve, Registry};
    use serde_json::json;

    fn registry() -> Registry {
        resolve(&builtin().unwrap()).unwrap()
    }

    #[test]
    fn select_list_renders_membership_predicate() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        let mut query = QueryContext::new("user");
        query.and_where(Predicate::MemberOf {
            relation: "groups".into(),
            id: 4,
        });
        let q = select_list(user, &query);
        assert_eq!(
            q.sql,
            "SELECT \"id\"::int8 AS \"id\", \"name\"::text AS \"name\", \"email\"::text AS \"email\" \
             FROM \"user\" WHERE \"id\" IN (SELECT \"user_id\" FROM \"user_group\" WHERE \"group_id\" = $1::int8) \
             ORDER BY \"id\""
        );
        assert_eq!(q.params, vec![json!(4)]);
    }

    #[test]
    fn match_none_renders_false_condition() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        let mut query = QueryContext::new("user");
        query.and_where(Predicate::MatchNone);
        assert!(select_list(user, &query).sql.contains("WHERE 1 = 0"));
    }

    #[test]
    fn insert_skips_identifier_and_absent_fields() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        let record = Entity::new("user").with_id(9).with_value("name", json!("ann"));
        let q = insert(user, &record);
        assert_eq!(
            q.sql,
            "INSERT INTO \"user\" (\"name\") VALUES ($1::text) RETURNING \"id\"::int8"
        );
        assert_eq!(q.params, vec![json!("ann")]);
    }

    #[test]
    fn update_binds_id_last() {
        let registry = registry();
        let group = registry.get("group").unwrap();
        let record = Entity::new("group").with_value("name", json!("ops"));
        let q = update(group, &record, 3);
        assert_eq!(q.sql, "UPDATE \"group\" SET \"name\" = $1::text WHERE \"id\" = $2::int8");
        assert_eq!(q.params, vec![json!("ops"), json!(3)]);
    }

    #[test]
    fn link_insert_ignores_duplicates() {
        let registry = registry();
        let user = registry.get("user").unwrap();
        let row = LinkRow::new(user.relation("groups").unwrap(), 1, 2);
        let q = insert_link(&row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"user_group\" (\"user_id\", \"group_id\") VALUES ($1::int8, $2::int8) ON CONFLICT DO NOTHING"
        );
    }
}

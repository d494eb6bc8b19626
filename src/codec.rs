//! Visibility-scoped encode/decode between [`Entity`] and JSON.
//!
//! A field or relation takes part in an operation iff it carries the operation's
//! scope tag. Nested relations are encoded under the same tag with their own
//! relations dropped, so mutually referencing entities never expand recursively.

use crate::config::{EntityDescriptor, Registry};
use crate::entity::{Entity, Violation};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Related records loaded ahead of encoding, by entity kind and id.
#[derive(Clone, Debug, Default)]
pub struct RelatedEntities {
    by_kind: HashMap<String, BTreeMap<i64, Entity>>,
}

impl RelatedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) {
        if let Some(id) = entity.id {
            self.by_kind.entry(entity.kind.clone()).or_default().insert(id, entity);
        }
    }

    pub fn get(&self, kind: &str, id: i64) -> Option<&Entity> {
        self.by_kind.get(kind).and_then(|m| m.get(&id))
    }
}

/// Encode `entity` with exactly the fields and relations tagged `scope`.
pub fn encode(
    registry: &Registry,
    descriptor: &EntityDescriptor,
    entity: &Entity,
    scope: &str,
    related: &RelatedEntities,
) -> Value {
    let mut out = encode_scalars(descriptor, entity, scope);
    for relation in descriptor.relations.iter().filter(|r| r.in_scope(scope)) {
        let nested: Vec<Value> = match registry.get(&relation.target) {
            Some(target) => entity
                .related_ids(&relation.name)
                .filter_map(|id| related.get(&target.name, id))
                .map(|r| Value::Object(encode_scalars(target, r, scope)))
                .collect(),
            None => Vec::new(),
        };
        out.insert(relation.name.clone(), Value::Array(nested));
    }
    Value::Object(out)
}

fn encode_scalars(descriptor: &EntityDescriptor, entity: &Entity, scope: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for field in descriptor.fields.iter().filter(|f| f.in_scope(scope)) {
        let value = if field.identifier {
            entity.id.map(Value::from).unwrap_or(Value::Null)
        } else {
            entity.value(&field.name).cloned().unwrap_or(Value::Null)
        };
        out.insert(field.name.clone(), value);
    }
    out
}

/// Create-mode decode: a fresh entity holding only the scope-tagged data fields
/// present in `payload`. Identifier, relations and unknown keys are ignored.
pub fn decode_new(descriptor: &EntityDescriptor, payload: &Value, scope: &str) -> Result<Entity, Violation> {
    let object = as_object(payload)?;
    let mut entity = Entity::new(descriptor.name.clone());
    for field in descriptor.data_fields().filter(|f| f.in_scope(scope)) {
        if let Some(v) = object.get(&field.name) {
            entity.set_value(field.name.clone(), v.clone());
        }
    }
    Ok(entity)
}

/// Merge-mode decode: overwrite the data fields present in `payload` on an
/// existing entity. With `scope`, only tagged fields are taken. The identifier
/// and relations are never touched.
pub fn decode_merge(
    descriptor: &EntityDescriptor,
    entity: &mut Entity,
    payload: &Value,
    scope: Option<&str>,
) -> Result<(), Violation> {
    let object = as_object(payload)?;
    for field in descriptor
        .data_fields()
        .filter(|f| scope.map(|s| f.in_scope(s)).unwrap_or(true))
    {
        if let Some(v) = object.get(&field.name) {
            entity.set_value(field.name.clone(), v.clone());
        }
    }
    Ok(())
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, Violation> {
    payload
        .as_object()
        .ok_or_else(|| Violation::global("payload must be a JSON object"))
}

//! Runtime record shared by the codec, the validator and the stores.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One record of a described entity type.
///
/// Relations are plain id sets keyed by relation name; keeping both sides of a
/// many-to-many pair in step is the engine's job, not the record's.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entity {
    pub kind: String,
    /// `None` until the store assigns one on commit.
    pub id: Option<i64>,
    pub values: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, BTreeSet<i64>>,
}

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Entity {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set_value(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Ids referenced through `relation`, ascending. Empty when the relation was never loaded.
    pub fn related_ids(&self, relation: &str) -> impl Iterator<Item = i64> + '_ {
        self.relations.get(relation).into_iter().flatten().copied()
    }

    pub fn is_linked(&self, relation: &str, id: i64) -> bool {
        self.relations
            .get(relation)
            .map(|ids| ids.contains(&id))
            .unwrap_or(false)
    }

    /// Returns true when the link was not present before.
    pub fn link(&mut self, relation: &str, id: i64) -> bool {
        self.relations.entry(relation.to_string()).or_default().insert(id)
    }

    /// Returns true when the link was present before.
    pub fn unlink(&mut self, relation: &str, id: i64) -> bool {
        self.relations
            .get_mut(relation)
            .map(|ids| ids.remove(&id))
            .unwrap_or(false)
    }
}

/// A single constraint failure. `field` is `None` for payload-level problems.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn global(message: impl Into<String>) -> Self {
        Violation {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Joins every violation for display, one per line, separated by `;`.
pub fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn link_is_idempotent() {
        let mut user = Entity::new("user").with_id(1);
        assert!(user.link("groups", 7));
        assert!(!user.link("groups", 7));
        assert_eq!(user.related_ids("groups").collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn unlink_of_missing_relation_is_noop() {
        let mut user = Entity::new("user").with_id(1);
        assert!(!user.unlink("groups", 7));
        assert_eq!(user.related_ids("groups").count(), 0);
    }

    #[test]
    fn violations_join_with_semicolon_newline() {
        let joined = join_violations(&[
            Violation::field("name", "must not be blank"),
            Violation::global("payload must be a JSON object"),
        ]);
        assert_eq!(joined, "name: must not be blank;\npayload must be a JSON object");
    }

    #[test]
    fn global_violation_omits_field_when_serialized() {
        let v = serde_json::to_value(Violation::global("bad")).unwrap();
        assert_eq!(v, json!({ "message": "bad" }));
    }
}

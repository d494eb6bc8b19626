//! Store-agnostic list query: a root entity and the predicates filters add to it.

use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied list parameters, name to raw string value.
pub type SearchParams = HashMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Scalar field equals value.
    FieldEquals { field: String, value: Value },
    /// Relation id set contains `id`.
    MemberOf { relation: String, id: i64 },
    /// Matches nothing. Added when a parameter cannot be interpreted.
    MatchNone,
}

/// Pending list query. Predicates are AND-ed in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryContext {
    root: String,
    predicates: Vec<Predicate>,
}

impl QueryContext {
    pub fn new(root: impl Into<String>) -> Self {
        QueryContext {
            root: root.into(),
            predicates: Vec::new(),
        }
    }

    /// Entity name the query selects from.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn and_where(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }
}

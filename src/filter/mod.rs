//! List filters: conditional predicates applied to every list query.

mod query;

pub use query::{Predicate, QueryContext, SearchParams};

use crate::config::{FieldType, FilterConfig, Registry};
use crate::error::ConfigError;
use serde_json::Value;

/// A conditional query rewrite. Each filter decides for itself whether it applies.
pub trait QueryFilter: Send + Sync {
    fn supports(&self, query: &QueryContext, params: &SearchParams) -> bool;

    fn apply(&self, query: &mut QueryContext, params: &SearchParams);
}

/// Filters in registration order.
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn QueryFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl QueryFilter + 'static) -> Self {
        self.register(filter);
        self
    }

    pub fn register(&mut self, filter: impl QueryFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// Build from config, resolving field types against the registry.
    pub fn from_config(configs: &[FilterConfig], registry: &Registry) -> Result<Self, ConfigError> {
        let mut pipeline = FilterPipeline::new();
        for c in configs {
            match c {
                FilterConfig::MemberOf { entity, param, relation } => {
                    pipeline.register(MemberOfFilter::new(entity, param, relation));
                }
                FilterConfig::FieldEquals { entity, field, param } => {
                    let field_type = registry
                        .get(entity)
                        .and_then(|e| e.field(field))
                        .map(|f| f.field_type)
                        .ok_or_else(|| ConfigError::MissingReference {
                            kind: "field",
                            id: format!("{}.{}", entity, field),
                        })?;
                    let param = param.as_deref().unwrap_or(field);
                    pipeline.register(FieldEqualsFilter::new(entity, field, param, field_type));
                }
            }
        }
        Ok(pipeline)
    }

    pub fn apply(&self, query: &mut QueryContext, params: &SearchParams) {
        for filter in &self.filters {
            if filter.supports(query, params) {
                filter.apply(query, params);
            }
        }
        if !query.predicates().is_empty() {
            tracing::debug!(root = %query.root(), predicates = ?query.predicates(), "filters applied");
        }
    }
}

/// Restricts `entity` listings to records whose `relation` contains the id in `param`.
pub struct MemberOfFilter {
    entity: String,
    param: String,
    relation: String,
}

impl MemberOfFilter {
    pub fn new(entity: impl Into<String>, param: impl Into<String>, relation: impl Into<String>) -> Self {
        MemberOfFilter {
            entity: entity.into(),
            param: param.into(),
            relation: relation.into(),
        }
    }
}

impl QueryFilter for MemberOfFilter {
    fn supports(&self, query: &QueryContext, params: &SearchParams) -> bool {
        query.root() == self.entity && params.contains_key(&self.param)
    }

    fn apply(&self, query: &mut QueryContext, params: &SearchParams) {
        let predicate = match params.get(&self.param).and_then(|v| v.trim().parse::<i64>().ok()) {
            Some(id) => Predicate::MemberOf {
                relation: self.relation.clone(),
                id,
            },
            None => Predicate::MatchNone,
        };
        query.and_where(predicate);
    }
}

/// Exact match on a scalar field.
pub struct FieldEqualsFilter {
    entity: String,
    field: String,
    param: String,
    field_type: FieldType,
}

impl FieldEqualsFilter {
    pub fn new(
        entity: impl Into<String>,
        field: impl Into<String>,
        param: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        FieldEqualsFilter {
            entity: entity.into(),
            field: field.into(),
            param: param.into(),
            field_type,
        }
    }
}

impl QueryFilter for FieldEqualsFilter {
    fn supports(&self, query: &QueryContext, params: &SearchParams) -> bool {
        query.root() == self.entity && params.contains_key(&self.param)
    }

    fn apply(&self, query: &mut QueryContext, params: &SearchParams) {
        let predicate = match params.get(&self.param).and_then(|v| coerce_param(self.field_type, v)) {
            Some(value) => Predicate::FieldEquals {
                field: self.field.clone(),
                value,
            },
            None => Predicate::MatchNone,
        };
        query.and_where(predicate);
    }
}

/// Interpret a query-string value as the field's type.
pub fn coerce_param(field_type: FieldType, s: &str) -> Option<Value> {
    match field_type {
        FieldType::Integer => s.trim().parse::<i64>().ok().map(Value::from),
        FieldType::Float => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if s.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        FieldType::String => Some(Value::String(s.to_string())),
    }
}

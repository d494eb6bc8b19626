//! Config validation: referential integrity and relation symmetry.

use crate::config::{EntitiesConfig, EntityConfig, FieldType, FilterConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &EntitiesConfig) -> Result<(), ConfigError> {
    if config.entities.is_empty() {
        return Err(ConfigError::Validation("at least one entity required".into()));
    }

    let mut by_name: HashMap<&str, &EntityConfig> = HashMap::new();
    let mut path_segments = HashSet::new();
    for e in &config.entities {
        if by_name.insert(e.name.as_str(), e).is_some() {
            return Err(ConfigError::DuplicateName(e.name.clone()));
        }
        let path = e.path_segment.as_deref().unwrap_or(&e.name);
        if !path_segments.insert(path) {
            return Err(ConfigError::DuplicatePathSegment(path.to_string()));
        }
    }

    // A path segment may only shadow its own entity's name.
    for e in &config.entities {
        let path = e.path_segment.as_deref().unwrap_or(&e.name);
        if path != e.name && by_name.contains_key(path) {
            return Err(ConfigError::DuplicatePathSegment(path.to_string()));
        }
    }

    for e in &config.entities {
        validate_members(e)?;
    }

    for e in &config.entities {
        for r in &e.relations {
            let target = by_name.get(r.target.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: r.target.clone(),
            })?;
            let inverse = target
                .relations
                .iter()
                .find(|i| i.name == r.inverse)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "relation",
                    id: format!("{}.{}", r.target, r.inverse),
                })?;
            let symmetric = inverse.target == e.name
                && inverse.inverse == r.name
                && inverse.link.table == r.link.table
                && inverse.link.column == r.link.target_column
                && inverse.link.target_column == r.link.column;
            if !symmetric {
                return Err(ConfigError::AsymmetricRelation {
                    entity: e.name.clone(),
                    relation: r.name.clone(),
                });
            }
        }
    }

    for f in &config.filters {
        validate_filter(f, &by_name)?;
    }

    Ok(())
}

fn validate_members(e: &EntityConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for name in e.fields.iter().map(|f| &f.name).chain(e.relations.iter().map(|r| &r.name)) {
        if !names.insert(name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{}: duplicate member '{}'",
                e.name, name
            )));
        }
    }

    let ids: Vec<_> = e.fields.iter().filter(|f| f.identifier).collect();
    match ids.as_slice() {
        [id] if id.type_ == FieldType::Integer => Ok(()),
        [_] => Err(ConfigError::InvalidIdentifier(format!(
            "{}: identifier must be an integer",
            e.name
        ))),
        [] => Err(ConfigError::InvalidIdentifier(format!(
            "{}: no identifier field",
            e.name
        ))),
        _ => Err(ConfigError::InvalidIdentifier(format!(
            "{}: more than one identifier field",
            e.name
        ))),
    }
}

fn validate_filter(f: &FilterConfig, by_name: &HashMap<&str, &EntityConfig>) -> Result<(), ConfigError> {
    match f {
        FilterConfig::MemberOf { entity, relation, .. } => {
            let e = by_name.get(entity.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: entity.clone(),
            })?;
            if !e.relations.iter().any(|r| &r.name == relation) {
                return Err(ConfigError::MissingReference {
                    kind: "relation",
                    id: format!("{}.{}", entity, relation),
                });
            }
        }
        FilterConfig::FieldEquals { entity, field, .. } => {
            let e = by_name.get(entity.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: entity.clone(),
            })?;
            if !e.fields.iter().any(|c| &c.name == field) {
                return Err(ConfigError::MissingReference {
                    kind: "field",
                    id: format!("{}.{}", entity, field),
                });
            }
        }
    }
    Ok(())
}

//! Load descriptor config from a JSON file or the built-in sample, and resolve it.

use crate::config::resolved::{
    EntityDescriptor, FieldDescriptor, FieldFormat, LinkTable, OperationScopes, RelationDescriptor, Registry,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use regex::Regex;
use std::path::Path;

const BUILTIN_ENTITIES: &str = include_str!("entities.json");

/// Loose address check: something, `@`, a host with at least one dot.
const EMAIL_PATTERN: &str = r"^.+@\S+\.\S+$";

/// The sample "group"/"user" schemas with their membership filter.
pub fn builtin() -> Result<EntitiesConfig, ConfigError> {
    serde_json::from_str(BUILTIN_ENTITIES).map_err(|e| ConfigError::Load(format!("built-in entities: {}", e)))
}

pub async fn load_from_path(path: impl AsRef<Path>) -> Result<EntitiesConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build the registry from config (validates first).
pub fn resolve(config: &EntitiesConfig) -> Result<Registry, ConfigError> {
    validate(config)?;
    let mut descriptors = Vec::with_capacity(config.entities.len());
    for e in &config.entities {
        descriptors.push(resolve_entity(e)?);
    }
    tracing::debug!(entities = descriptors.len(), filters = config.filters.len(), "resolved entity config");
    Ok(Registry::from_descriptors(descriptors))
}

fn resolve_entity(e: &EntityConfig) -> Result<EntityDescriptor, ConfigError> {
    let mut fields = Vec::with_capacity(e.fields.len());
    for f in &e.fields {
        fields.push(resolve_field(&e.name, f)?);
    }
    let id_index = fields
        .iter()
        .position(|f| f.identifier)
        .ok_or_else(|| ConfigError::InvalidIdentifier(format!("{}: no identifier field", e.name)))?;

    let relations = e
        .relations
        .iter()
        .map(|r| RelationDescriptor {
            name: r.name.clone(),
            target: r.target.clone(),
            inverse: r.inverse.clone(),
            link: LinkTable {
                table: r.link.table.clone(),
                column: r.link.column.clone(),
                target_column: r.link.target_column.clone(),
            },
            scopes: r.scopes.iter().cloned().collect(),
        })
        .collect();

    let scopes = OperationScopes {
        list: e.scopes.list.clone().unwrap_or_else(|| e.name.clone()),
        read: e.scopes.read.clone().unwrap_or_else(|| e.name.clone()),
        create: e.scopes.create.clone().unwrap_or_else(|| format!("{}.create", e.name)),
        update: e.scopes.update.clone(),
    };

    Ok(EntityDescriptor::new(
        e.name.clone(),
        e.path_segment.clone().unwrap_or_else(|| e.name.clone()),
        e.table.clone().unwrap_or_else(|| e.name.clone()),
        fields,
        relations,
        scopes,
        id_index,
    ))
}

fn resolve_field(entity: &str, f: &FieldConfig) -> Result<FieldDescriptor, ConfigError> {
    let format = match f.validation.format.as_deref().map(str::to_lowercase).as_deref() {
        None => None,
        Some("email") => Some(FieldFormat::Email(compile(entity, &f.name, EMAIL_PATTERN)?)),
        Some("uuid") => Some(FieldFormat::Uuid),
        Some(other) => {
            return Err(ConfigError::Validation(format!(
                "{}.{}: unknown format '{}'",
                entity, f.name, other
            )))
        }
    };
    let pattern = f
        .validation
        .pattern
        .as_deref()
        .map(|p| compile(entity, &f.name, p))
        .transpose()?;

    Ok(FieldDescriptor {
        name: f.name.clone(),
        column: f.column.clone().unwrap_or_else(|| f.name.clone()),
        field_type: f.type_,
        identifier: f.identifier,
        scopes: f.scopes.iter().cloned().collect(),
        rules: f.validation.clone(),
        format,
        pattern,
    })
}

fn compile(entity: &str, field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Validation(format!("{}.{}: invalid pattern: {}", entity, field, e)))
}

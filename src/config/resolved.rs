//! Resolved descriptors: config validated and flattened for runtime use.

use crate::config::{FieldType, ValidationRule};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Format checks compiled once at resolve time.
#[derive(Clone, Debug)]
pub enum FieldFormat {
    Email(Regex),
    Uuid,
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub field_type: FieldType,
    pub identifier: bool,
    pub scopes: HashSet<String>,
    pub rules: ValidationRule,
    pub format: Option<FieldFormat>,
    pub pattern: Option<Regex>,
}

impl FieldDescriptor {
    pub fn in_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkTable {
    pub table: String,
    pub column: String,
    pub target_column: String,
}

#[derive(Clone, Debug)]
pub struct RelationDescriptor {
    pub name: String,
    /// Name of the related entity.
    pub target: String,
    /// Name of the relation on `target` that points back here.
    pub inverse: String,
    pub link: LinkTable,
    pub scopes: HashSet<String>,
}

impl RelationDescriptor {
    pub fn in_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationScopes {
    pub list: String,
    pub read: String,
    pub create: String,
    /// `None` means merge-mode decode accepts every writable field.
    pub update: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub name: String,
    pub path_segment: String,
    pub table_name: String,
    /// All scalar fields in declaration order, identifier included.
    pub fields: Vec<FieldDescriptor>,
    pub relations: Vec<RelationDescriptor>,
    pub scopes: OperationScopes,
    id_index: usize,
}

impl EntityDescriptor {
    pub(crate) fn new(
        name: String,
        path_segment: String,
        table_name: String,
        fields: Vec<FieldDescriptor>,
        relations: Vec<RelationDescriptor>,
        scopes: OperationScopes,
        id_index: usize,
    ) -> Self {
        EntityDescriptor {
            name,
            path_segment,
            table_name,
            fields,
            relations,
            scopes,
            id_index,
        }
    }

    pub fn id_field(&self) -> &FieldDescriptor {
        &self.fields[self.id_index]
    }

    /// Non-identifier scalar fields.
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
        self.fields.iter().filter(|f| !f.identifier)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// Maps type tokens (entity name or path segment) to descriptors.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entities: Vec<Arc<EntityDescriptor>>,
    by_name: HashMap<String, usize>,
    by_path: HashMap<String, usize>,
}

impl Registry {
    pub(crate) fn from_descriptors(entities: Vec<EntityDescriptor>) -> Self {
        let mut registry = Registry::default();
        for (i, e) in entities.into_iter().enumerate() {
            registry.by_name.insert(e.name.clone(), i);
            registry.by_path.insert(e.path_segment.clone(), i);
            registry.entities.push(Arc::new(e));
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&Arc<EntityDescriptor>> {
        self.by_path.get(path).map(|&i| &self.entities[i])
    }

    /// Entity name first, then path segment.
    pub fn resolve(&self, token: &str) -> Option<&Arc<EntityDescriptor>> {
        self.get(token).or_else(|| self.entity_by_path(token))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> + '_ {
        self.entities.iter()
    }
}

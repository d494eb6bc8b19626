//! Raw entity-descriptor config types matching the JSON file format.

use serde::{Deserialize, Serialize};

/// Whole descriptor file: entity schemas plus the list filters that act on them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntitiesConfig {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    /// Applied to every list call in declaration order.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// URL segment; defaults to `name`.
    #[serde(default)]
    pub path_segment: Option<String>,
    /// Backing table; defaults to `name`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub scopes: ScopesConfig,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// Scope names per operation. Missing entries fall back to `name` (list, read)
/// and `name.create` (create); a missing `update` leaves merges unrestricted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScopesConfig {
    #[serde(default)]
    pub list: Option<String>,
    #[serde(default)]
    pub read: Option<String>,
    #[serde(default)]
    pub create: Option<String>,
    #[serde(default)]
    pub update: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    /// Store-assigned identifier. Exactly one per entity.
    #[serde(default)]
    pub identifier: bool,
    /// Column name; defaults to `name`.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub validation: ValidationRule,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Present and non-null.
    #[serde(default)]
    pub required: Option<bool>,
    /// Present, non-null and not the empty string.
    #[serde(default)]
    pub not_blank: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// One side of a many-to-many pair. Both sides must name each other as `inverse`
/// and share the link table with the columns swapped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub target: String,
    pub inverse: String,
    pub link: LinkConfig,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub table: String,
    /// Column holding this side's id.
    pub column: String,
    /// Column holding the target's id.
    pub target_column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Keep records whose `relation` contains the id given in `param`.
    MemberOf {
        entity: String,
        param: String,
        relation: String,
    },
    /// Keep records whose `field` equals the value given in `param` (defaults to the field name).
    FieldEquals {
        entity: String,
        field: String,
        #[serde(default)]
        param: Option<String>,
    },
}

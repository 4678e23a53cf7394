//! Queryable model of the destination graph schema.
//!
//! Built once from the schema text at startup and shared read-only for the
//! whole run. Only the constructs the ingester needs are retained: attribute
//! value types, entity ownership, relation roles and per-entity playable roles.

mod parser;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Value type of a schema attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Double,
    Integer,
    Boolean,
    Datetime,
    /// Declared with a type the ingester does not write (e.g. `decimal`).
    Other(String),
}

impl ValueType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "string" => ValueType::String,
            "double" => ValueType::Double,
            "integer" | "long" => ValueType::Integer,
            "boolean" => ValueType::Boolean,
            "datetime" => ValueType::Datetime,
            other => ValueType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ValueType::String => "string",
            ValueType::Double => "double",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Datetime => "datetime",
            ValueType::Other(name) => name,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory view of the destination schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaMetadata {
    pub attribute_value_types: HashMap<String, ValueType>,
    pub entity_owned_attrs: HashMap<String, BTreeSet<String>>,
    /// Declared roles per relation, in declaration order.
    pub relation_roles: HashMap<String, Vec<String>>,
    pub entity_relation_roles: HashMap<(String, String), BTreeSet<String>>,
}

impl SchemaMetadata {
    /// Parse schema source text. Never fails: unknown constructs are ignored.
    pub fn parse(text: &str) -> Self {
        parser::parse_schema(text)
    }

    /// Read and parse a schema file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read schema {}: {}", path.display(), e))
        })?;
        let schema = Self::parse(&text);
        log::info!(
            "Schema loaded from {}: {} attributes, {} entities, {} relations",
            path.display(),
            schema.attribute_value_types.len(),
            schema.entity_owned_attrs.len(),
            schema.relation_roles.len()
        );
        Ok(schema)
    }

    pub fn value_type(&self, attr: &str) -> Option<&ValueType> {
        self.attribute_value_types.get(attr)
    }

    pub fn owns(&self, entity: &str, attr: &str) -> bool {
        self.entity_owned_attrs
            .get(entity)
            .is_some_and(|attrs| attrs.contains(attr))
    }

    pub fn declared_roles(&self, relation: &str) -> &[String] {
        self.relation_roles
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Roles `entity` may play in `relation`; empty when undeclared.
    pub fn playable_roles(&self, entity: &str, relation: &str) -> BTreeSet<String> {
        self.entity_relation_roles
            .get(&(entity.to_string(), relation.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// True when the entity type appears anywhere in the schema.
    pub fn knows_entity(&self, entity: &str) -> bool {
        self.entity_owned_attrs.contains_key(entity)
            || self
                .entity_relation_roles
                .keys()
                .any(|(name, _)| name == entity)
    }
}

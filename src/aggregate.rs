//! Aggregate mapping registry
//!
//! Maps a logical aggregate type name (e.g. "GenericRoute") to the physical
//! table holding its rows, the foreign key column linking each row to its
//! owning entity, and the default order column. The set of aggregate types is
//! closed at startup; dispatch is a registry lookup, never reflection.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::registry::SchemaRegistry;

/// Mapping from one logical aggregate type to its physical storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateMapping {
    /// Logical type name, unique within the registry
    #[serde(rename = "typeName")]
    pub type_name: String,

    /// Physical table name; must resolve in the schema registry
    pub table: String,

    /// Column linking aggregate rows to their owning entity's uid
    #[serde(rename = "ownerKey")]
    pub owner_key: String,

    /// Column used for default ordering of aggregate rows
    #[serde(rename = "defaultOrder")]
    pub default_order: String,
}

impl AggregateMapping {
    /// Create a new aggregate mapping
    pub fn new(
        type_name: impl Into<String>,
        table: impl Into<String>,
        owner_key: impl Into<String>,
        default_order: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            table: table.into(),
            owner_key: owner_key.into(),
            default_order: default_order.into(),
        }
    }
}

/// Registry of aggregate mappings, populated at startup and read-only after
///
/// Registration order is significant: cascading deletes remove aggregate rows
/// table by table in the order the mappings were registered.
#[derive(Debug, Clone, Default)]
pub struct AggregateRegistry {
    mappings: Vec<AggregateMapping>,
}

impl AggregateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an aggregate mapping
    ///
    /// The physical table must already be registered in the schema registry,
    /// and both the owner key and default order columns must exist on it.
    pub fn register(&mut self, mapping: AggregateMapping, schema: &SchemaRegistry) -> Result<()> {
        if mapping.type_name.is_empty() {
            return Err(StoreError::schema_validation(
                "Aggregate type name cannot be empty",
            ));
        }

        if self.mappings.iter().any(|m| m.type_name == mapping.type_name) {
            return Err(StoreError::schema_validation(format!(
                "Aggregate type '{}' is already registered",
                mapping.type_name
            )));
        }

        let table = schema.require_table(&mapping.table)?;

        if !table.has_field(&mapping.owner_key) {
            return Err(StoreError::schema_validation(format!(
                "Owner key column '{}' does not exist on table '{}'",
                mapping.owner_key, mapping.table
            )));
        }

        if !table.has_field(&mapping.default_order) {
            return Err(StoreError::schema_validation(format!(
                "Default order column '{}' does not exist on table '{}'",
                mapping.default_order, mapping.table
            )));
        }

        self.mappings.push(mapping);
        Ok(())
    }

    /// Resolve an aggregate type name to its mapping
    ///
    /// Callers must fail the whole request on `UnknownAggregateType`, never
    /// silently default to a table.
    pub fn resolve(&self, type_name: &str) -> Result<&AggregateMapping> {
        self.mappings
            .iter()
            .find(|m| m.type_name == type_name)
            .ok_or_else(|| StoreError::unknown_aggregate_type(type_name))
    }

    /// All mappings in registration (dependency) order
    pub fn iter(&self) -> impl Iterator<Item = &AggregateMapping> {
        self.mappings.iter()
    }

    /// Number of registered aggregate types
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

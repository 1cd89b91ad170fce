//! Schema registry: table and field metadata
//!
//! The registry is the process-wide description of every table the store is
//! allowed to touch. It is populated once at startup and read-only afterward;
//! every dynamic identifier is validated against it before reaching SQL text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::sql::sanitize::is_valid_identifier;

/// Logical field type with validation and bind mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// Text field (maps to TEXT)
    Text,

    /// Integer field (maps to BIGINT)
    Integer,

    /// Decimal field (maps to NUMERIC)
    Decimal,

    /// Boolean field (maps to BOOLEAN)
    Boolean,

    /// Timestamp field, always UTC (maps to TIMESTAMPTZ)
    Timestamp,

    /// JSON field (maps to JSONB)
    Json,
}

impl FieldType {
    /// Validate that a JSON value is compatible with this field type
    pub fn validate_value(&self, value: &serde_json::Value) -> std::result::Result<(), String> {
        // Null is handled by the store, not type validation
        if value.is_null() {
            return Ok(());
        }

        match (self, value) {
            (FieldType::Text, serde_json::Value::String(_)) => Ok(()),
            (FieldType::Integer, serde_json::Value::Number(n)) if n.is_i64() => Ok(()),
            // Allow string-to-integer coercion (common when importing from CSV)
            (FieldType::Integer, serde_json::Value::String(s)) => s
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to integer", s)),
            (FieldType::Decimal, serde_json::Value::Number(_)) => Ok(()),
            (FieldType::Decimal, serde_json::Value::String(s)) => s
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to decimal", s)),
            (FieldType::Boolean, serde_json::Value::Bool(_)) => Ok(()),
            (FieldType::Timestamp, serde_json::Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|_| ())
                    .map_err(|e| format!("Invalid timestamp format: {}", e))
            }
            (FieldType::Json, _) => Ok(()),
            _ => Err(format!(
                "Type mismatch: expected {:?}, got {:?}",
                self, value
            )),
        }
    }
}

/// Field metadata for one column of a registered table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDescriptor {
    /// Column name (must match `^[A-Za-z0-9_]+$`)
    pub name: String,

    /// Logical field type
    #[serde(flatten)]
    pub field_type: FieldType,

    /// Whether the field is part of the primary key (default: false)
    #[serde(default, rename = "primaryKey")]
    pub primary_key: bool,

    /// Whether the field appears in UI-facing property lists (default: true)
    #[serde(default = "default_exportable")]
    pub exportable: bool,

    /// Whether the field may appear in a filter map (default: true)
    #[serde(default = "default_filterable")]
    pub filterable: bool,

    /// Whether this is the table's primary display field used for
    /// human-facing search (default: false)
    #[serde(default)]
    pub display: bool,
}

fn default_exportable() -> bool {
    true
}

fn default_filterable() -> bool {
    true
}

impl FieldDescriptor {
    /// Create a new field descriptor with a name and type
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary_key: false,
            exportable: true,
            filterable: true,
            display: false,
        }
    }

    /// Mark the field as part of the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Exclude the field from UI-facing property lists
    pub fn not_exportable(mut self) -> Self {
        self.exportable = false;
        self
    }

    /// Exclude the field from filter maps
    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    /// Mark the field as the table's primary display field
    pub fn display(mut self) -> Self {
        self.display = true;
        self
    }
}

/// Immutable description of one table: name plus ordered field list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDescriptor {
    /// Table name (must match `^[A-Za-z0-9_]+$`)
    pub name: String,

    /// Ordered field descriptors
    pub fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    /// Create a new table descriptor
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the table has a field with the given name
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Fields that make up the primary key, in declaration order
    pub fn primary_key_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }

    /// Fields that appear in UI-facing property lists, in declaration order
    pub fn exportable_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.exportable).collect()
    }

    /// The primary display field: the one flagged `display`, falling back to
    /// the first exportable non-key field
    pub fn display_field(&self) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.display)
            .or_else(|| self.fields.iter().find(|f| f.exportable && !f.primary_key))
    }
}

/// Registry of table descriptors, populated at startup and read-only after
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableDescriptor>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table descriptor
    ///
    /// Idempotent: registering the same descriptor twice is a no-op.
    /// Registering a descriptor whose name collides with an existing table of
    /// a different shape fails. Table and field names must pass the
    /// identifier allow-list.
    pub fn register_table(&mut self, descriptor: TableDescriptor) -> Result<()> {
        if !is_valid_identifier(&descriptor.name) {
            return Err(StoreError::schema_validation(format!(
                "Invalid table name '{}'",
                descriptor.name
            )));
        }

        for field in &descriptor.fields {
            if !is_valid_identifier(&field.name) {
                return Err(StoreError::schema_validation(format!(
                    "Invalid field name '{}' on table '{}'",
                    field.name, descriptor.name
                )));
            }
        }

        if let Some(existing) = self.tables.get(&descriptor.name) {
            if *existing == descriptor {
                return Ok(());
            }
            return Err(StoreError::schema_validation(format!(
                "Table '{}' is already registered with a different shape",
                descriptor.name
            )));
        }

        self.tables.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a table descriptor by name
    pub fn get_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    /// Look up a table descriptor, failing with a validation error naming the
    /// offending identifier when absent
    pub fn require_table(&self, name: &str) -> Result<&TableDescriptor> {
        self.get_table(name).ok_or_else(|| {
            StoreError::schema_validation(format!("Unknown table '{}'", name))
        })
    }

    /// Validate an identifier against the allow-list
    pub fn is_valid_identifier(&self, name: &str) -> bool {
        is_valid_identifier(name)
    }

    /// Ordered exportable fields of a registered table
    pub fn get_exportable_fields(&self, table: &str) -> Result<Vec<&FieldDescriptor>> {
        Ok(self.require_table(table)?.exportable_fields())
    }

    /// Primary-key fields of a registered table
    pub fn get_primary_key_fields(&self, table: &str) -> Result<Vec<&FieldDescriptor>> {
        Ok(self.require_table(table)?.primary_key_fields())
    }

    /// Names of all registered tables
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drugs_descriptor() -> TableDescriptor {
        TableDescriptor::new(
            "drugs",
            vec![
                FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                FieldDescriptor::new("name", FieldType::Text).display(),
                FieldDescriptor::new("mfr", FieldType::Text),
                FieldDescriptor::new("internal_rank", FieldType::Integer).not_exportable(),
            ],
        )
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = SchemaRegistry::new();
        registry.register_table(drugs_descriptor()).unwrap();

        let table = registry.get_table("drugs").unwrap();
        assert_eq!(table.name, "drugs");
        assert_eq!(table.fields.len(), 4);
        assert!(registry.get_table("missing").is_none());
    }

    #[test]
    fn test_register_idempotent() {
        let mut registry = SchemaRegistry::new();
        registry.register_table(drugs_descriptor()).unwrap();
        // Same shape again is a no-op
        registry.register_table(drugs_descriptor()).unwrap();
        assert_eq!(registry.table_names(), vec!["drugs"]);
    }

    #[test]
    fn test_register_conflicting_shape_fails() {
        let mut registry = SchemaRegistry::new();
        registry.register_table(drugs_descriptor()).unwrap();

        let other = TableDescriptor::new(
            "drugs",
            vec![FieldDescriptor::new("uid", FieldType::Text).primary_key()],
        );
        let err = registry.register_table(other).unwrap_err();
        assert!(matches!(err, StoreError::SchemaValidation(_)));
        assert!(err.to_string().contains("different shape"));
    }

    #[test]
    fn test_register_rejects_invalid_identifiers() {
        let mut registry = SchemaRegistry::new();

        let bad_table = TableDescriptor::new("drop table;", vec![]);
        assert!(matches!(
            registry.register_table(bad_table),
            Err(StoreError::SchemaValidation(_))
        ));

        let bad_field = TableDescriptor::new(
            "drugs",
            vec![FieldDescriptor::new("name; --", FieldType::Text)],
        );
        let err = registry.register_table(bad_field).unwrap_err();
        assert!(err.to_string().contains("name; --"));
    }

    #[test]
    fn test_derived_field_lists() {
        let table = drugs_descriptor();

        let pks: Vec<&str> = table
            .primary_key_fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(pks, vec!["uid"]);

        let exportable: Vec<&str> = table
            .exportable_fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(exportable, vec!["uid", "name", "mfr"]);
    }

    #[test]
    fn test_display_field() {
        let table = drugs_descriptor();
        assert_eq!(table.display_field().unwrap().name, "name");

        // Without an explicit display flag, falls back to first exportable
        // non-key field
        let table = TableDescriptor::new(
            "routes",
            vec![
                FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                FieldDescriptor::new("route", FieldType::Text),
            ],
        );
        assert_eq!(table.display_field().unwrap().name, "route");
    }

    #[test]
    fn test_require_table_names_offender() {
        let registry = SchemaRegistry::new();
        let err = registry.require_table("ghost").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_field_type_validation() {
        assert!(FieldType::Text.validate_value(&serde_json::json!("abc")).is_ok());
        assert!(FieldType::Text.validate_value(&serde_json::json!(5)).is_err());
        assert!(FieldType::Integer.validate_value(&serde_json::json!(5)).is_ok());
        assert!(FieldType::Integer.validate_value(&serde_json::json!("17")).is_ok());
        assert!(FieldType::Integer.validate_value(&serde_json::json!("abc")).is_err());
        assert!(FieldType::Boolean.validate_value(&serde_json::json!(true)).is_ok());
        assert!(FieldType::Timestamp
            .validate_value(&serde_json::json!("2024-01-01T00:00:00Z"))
            .is_ok());
        assert!(FieldType::Timestamp
            .validate_value(&serde_json::json!("not-a-date"))
            .is_err());
        // Null defers to the store
        assert!(FieldType::Integer.validate_value(&serde_json::Value::Null).is_ok());
    }
}

//! Configuration for the entity store
//!
//! Provides a builder pattern for configuring the store.

/// Configuration for the entity store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Name of the entity-relationships table (default: "entity_relationships")
    pub relationship_table: String,
    /// Table holding top-level entities (default: "entities")
    pub ancestor_table: String,
    /// Table holding child entities (default: "child_entities")
    pub child_table: String,
    /// Column holding the human-readable entity key (default: "key")
    pub key_column: String,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    relationship_table: String,
    ancestor_table: String,
    child_table: String,
    key_column: String,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            relationship_table: "entity_relationships".to_string(),
            ancestor_table: "entities".to_string(),
            child_table: "child_entities".to_string(),
            key_column: "key".to_string(),
        }
    }

    /// Set the relationship table name (default: "entity_relationships")
    pub fn relationship_table(mut self, name: impl Into<String>) -> Self {
        self.relationship_table = name.into();
        self
    }

    /// Set the top-level entity table name (default: "entities")
    pub fn ancestor_table(mut self, name: impl Into<String>) -> Self {
        self.ancestor_table = name.into();
        self
    }

    /// Set the child entity table name (default: "child_entities")
    pub fn child_table(mut self, name: impl Into<String>) -> Self {
        self.child_table = name.into();
        self
    }

    /// Set the entity key column name (default: "key")
    pub fn key_column(mut self, name: impl Into<String>) -> Self {
        self.key_column = name.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            relationship_table: self.relationship_table,
            ancestor_table: self.ancestor_table,
            child_table: self.child_table,
            key_column: self.key_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::builder("postgres://localhost/test").build();

        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.relationship_table, "entity_relationships");
        assert_eq!(config.ancestor_table, "entities");
        assert_eq!(config.child_table, "child_entities");
        assert_eq!(config.key_column, "key");
    }

    #[test]
    fn test_full_custom_config() {
        let config = StoreConfig::builder("postgres://localhost/test")
            .relationship_table("drug_relationships")
            .ancestor_table("drugs")
            .child_table("manufactured_drugs")
            .key_column("name")
            .build();

        assert_eq!(config.relationship_table, "drug_relationships");
        assert_eq!(config.ancestor_table, "drugs");
        assert_eq!(config.child_table, "manufactured_drugs");
        assert_eq!(config.key_column, "name");
    }

    #[test]
    fn test_builder_order_independence() {
        let config1 = StoreConfig::builder("postgres://localhost/test")
            .ancestor_table("drugs")
            .key_column("name")
            .build();

        let config2 = StoreConfig::builder("postgres://localhost/test")
            .key_column("name")
            .ancestor_table("drugs")
            .build();

        assert_eq!(config1.ancestor_table, config2.ancestor_table);
        assert_eq!(config1.key_column, config2.key_column);
    }

    #[test]
    fn test_config_clone() {
        let config1 = StoreConfig::builder("postgres://localhost/test")
            .child_table("manufactured_drugs")
            .build();
        let config2 = config1.clone();

        assert_eq!(config1.database_url, config2.database_url);
        assert_eq!(config1.child_table, config2.child_table);
    }
}

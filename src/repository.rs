//! Entity store: UI-facing repository over the query engine
//!
//! Presents entities, child entities, and aggregate records as UI-shaped
//! structures while delegating all persistence to the query engine. Every
//! operation is a complete, independent unit of work; the only stateful
//! objects are the read-only registries.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::aggregate::AggregateRegistry;
use crate::config::StoreConfig;
use crate::engine::QueryEngine;
use crate::entity::{
    assemble_tree, find_orphans, ChildEntity, Entity, EntityTree, OrphanedRelationship,
    Relationship,
};
use crate::error::{Result, StoreError};
use crate::filter::{Criteria, SortDirection};
use crate::registry::SchemaRegistry;
use crate::sql::builder::UID_COLUMN;

/// Column on the relationship table referencing the ancestor entity
pub const ANCESTOR_COLUMN: &str = "ancestor_uid";
/// Column on the relationship table referencing the child entity
pub const CHILD_COLUMN: &str = "child_uid";

/// Repository over entities, child entities, relationships, and aggregates
pub struct EntityStore {
    engine: QueryEngine,
    aggregates: Arc<AggregateRegistry>,
    config: StoreConfig,
}

impl EntityStore {
    /// Connect to the database and build the store
    pub async fn connect(
        config: StoreConfig,
        schema: Arc<SchemaRegistry>,
        aggregates: Arc<AggregateRegistry>,
    ) -> Result<Self> {
        validate_store_tables(&schema, &config)?;
        let engine = QueryEngine::connect(&config, schema).await?;
        Ok(Self {
            engine,
            aggregates,
            config,
        })
    }

    /// Build the store over an existing engine
    pub fn from_engine(
        engine: QueryEngine,
        aggregates: Arc<AggregateRegistry>,
        config: StoreConfig,
    ) -> Result<Self> {
        validate_store_tables(engine.schema(), &config)?;
        Ok(Self {
            engine,
            aggregates,
            config,
        })
    }

    /// The underlying query engine
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// The store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Entity Operations
    // =========================================================================

    /// Look up one entity by its human-readable key
    pub async fn get_entity_by_key(&self, key: &str, table: &str) -> Result<Option<Entity>> {
        let criteria = Criteria::new().eq(&self.config.key_column, key);
        let (rows, _) = self
            .engine
            .select(table, None, &criteria, &[], Some(1), None)
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| entity_from_row(row, &self.config.key_column)))
    }

    /// Look up one entity by its stable uid
    pub async fn get_entity_by_uid(&self, uid: &str, table: &str) -> Result<Option<Entity>> {
        let criteria = Criteria::new().eq(UID_COLUMN, uid);
        let (rows, _) = self
            .engine
            .select(table, None, &criteria, &[], Some(1), None)
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| entity_from_row(row, &self.config.key_column)))
    }

    /// Case-insensitive substring search on the table's display field
    pub async fn search_entities(&self, term: &str, table: &str) -> Result<Vec<Entity>> {
        let descriptor = self.engine.schema().require_table(table)?;
        let display = descriptor.display_field().ok_or_else(|| {
            StoreError::schema_validation(format!(
                "Table '{}' has no display field to search",
                table
            ))
        })?;
        let display_name = display.name.clone();

        let criteria = Criteria::new().contains(&display_name, term);
        let order = vec![(display_name, SortDirection::Asc)];
        let (rows, _) = self
            .engine
            .select(table, None, &criteria, &order, None, None)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| entity_from_row(row, &self.config.key_column))
            .collect())
    }

    /// All entities of a table, ordered by key
    pub async fn list_entities(&self, table: &str) -> Result<Vec<Entity>> {
        let order = vec![(self.config.key_column.clone(), SortDirection::Asc)];
        let (rows, _) = self
            .engine
            .select(table, None, &Criteria::new(), &order, None, None)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| entity_from_row(row, &self.config.key_column))
            .collect())
    }

    /// Create an entity with a generated uid
    pub async fn create_entity(
        &self,
        properties: &serde_json::Map<String, serde_json::Value>,
        table: &str,
    ) -> Result<Entity> {
        let props = with_generated_uid(properties)?;
        let row = self.engine.insert(table, &props).await?;
        Ok(entity_from_row(row, &self.config.key_column))
    }

    /// Update the entity with the given key
    ///
    /// Returns `None` when no entity has that key.
    pub async fn update_entity(
        &self,
        key: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
        table: &str,
    ) -> Result<Option<Entity>> {
        let Some(existing) = self.get_entity_by_key(key, table).await? else {
            return Ok(None);
        };

        let row = self.engine.update(table, &existing.uid, properties).await?;
        Ok(row.map(|row| entity_from_row(row, &self.config.key_column)))
    }

    /// Delete the entity with the given key, cascading when the table is one
    /// of the configured entity-family tables
    pub async fn delete_entity(&self, key: &str, table: &str) -> Result<u64> {
        let Some(existing) = self.get_entity_by_key(key, table).await? else {
            return Ok(0);
        };
        self.delete_entity_by_uid(&existing.uid, table).await
    }

    /// Delete the entity with the given uid, cascading when the table is one
    /// of the configured entity-family tables
    pub async fn delete_entity_by_uid(&self, uid: &str, table: &str) -> Result<u64> {
        if table == self.config.ancestor_table || table == self.config.child_table {
            self.cascade_delete(uid, table).await
        } else {
            self.engine.delete(table, uid).await
        }
    }

    /// Ordered cascading delete: aggregate rows table by table in mapping
    /// registration order, then relationship rows, then the entity row
    ///
    /// Steps run strictly in dependency order. The cascade is best-effort:
    /// when a step fails, earlier steps are not undone and the error names
    /// the failed step plus everything already completed.
    async fn cascade_delete(&self, uid: &str, table: &str) -> Result<u64> {
        let mut completed: Vec<String> = Vec::new();
        let mut removed: u64 = 0;

        for mapping in self.aggregates.iter() {
            let criteria = Criteria::new().eq(&mapping.owner_key, uid);
            match self.engine.delete_where(&mapping.table, &criteria).await {
                Ok(count) => {
                    removed += count;
                    completed.push(mapping.table.clone());
                }
                Err(source) => {
                    return Err(StoreError::PartialCascade {
                        completed,
                        failed_step: mapping.table.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }

        let relationship_steps = [
            Criteria::new().eq(ANCESTOR_COLUMN, uid),
            Criteria::new().eq(CHILD_COLUMN, uid),
        ];
        for criteria in relationship_steps {
            match self
                .engine
                .delete_where(&self.config.relationship_table, &criteria)
                .await
            {
                Ok(count) => {
                    removed += count;
                    completed.push(self.config.relationship_table.clone());
                }
                Err(source) => {
                    return Err(StoreError::PartialCascade {
                        completed,
                        failed_step: self.config.relationship_table.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }

        match self.engine.delete(table, uid).await {
            Ok(count) => {
                debug!(uid, table, removed = removed + count, "cascade delete complete");
                Ok(removed + count)
            }
            Err(source) => Err(StoreError::PartialCascade {
                completed,
                failed_step: table.to_string(),
                source: Box::new(source),
            }),
        }
    }

    // =========================================================================
    // Tree Operations
    // =========================================================================

    /// Assemble the ancestor→child tree
    ///
    /// Loads all ancestors, all relationship rows, and all children, then
    /// joins in memory. Relationship rows that no longer resolve on either
    /// side are dropped from the tree (and logged); the maintenance sweep
    /// reports them.
    pub async fn get_entity_tree_data(&self) -> Result<EntityTree> {
        let ancestors = self.list_entities(&self.config.ancestor_table).await?;
        let relationships = self.load_relationships().await?;
        let children: Vec<ChildEntity> = self
            .list_entities(&self.config.child_table)
            .await?
            .into_iter()
            .map(|entity| ChildEntity {
                uid: entity.uid,
                key: entity.key,
                properties: entity.properties,
            })
            .collect();

        Ok(assemble_tree(ancestors, &relationships, children))
    }

    /// Create a child entity under the entity with the given key
    ///
    /// Verifies the parent exists, then inserts the child row and its
    /// relationship row inside one transaction: both writes succeed or
    /// neither does.
    pub async fn create_child_entity(
        &self,
        parent_key: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ChildEntity> {
        let parent = self
            .get_entity_by_key(parent_key, &self.config.ancestor_table)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(format!("Parent entity '{}' does not exist", parent_key))
            })?;

        let child_props = with_generated_uid(properties)?;

        let mut relationship_props = serde_json::Map::new();
        relationship_props.insert(
            UID_COLUMN.to_string(),
            serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
        );
        relationship_props.insert(
            ANCESTOR_COLUMN.to_string(),
            serde_json::Value::String(parent.uid.clone()),
        );
        relationship_props.insert(
            CHILD_COLUMN.to_string(),
            child_props[UID_COLUMN].clone(),
        );

        let mut tx = self.engine.pool().begin().await?;
        let child_row = self
            .engine
            .insert_with(&mut *tx, &self.config.child_table, &child_props)
            .await?;
        self.engine
            .insert_with(&mut *tx, &self.config.relationship_table, &relationship_props)
            .await?;
        tx.commit().await?;

        let entity = entity_from_row(child_row, &self.config.key_column);
        Ok(ChildEntity {
            uid: entity.uid,
            key: entity.key,
            properties: entity.properties,
        })
    }

    /// Load all relationship rows
    pub async fn load_relationships(&self) -> Result<Vec<Relationship>> {
        let columns = vec![
            UID_COLUMN.to_string(),
            ANCESTOR_COLUMN.to_string(),
            CHILD_COLUMN.to_string(),
        ];
        let order = vec![(UID_COLUMN.to_string(), SortDirection::Asc)];
        let (rows, _) = self
            .engine
            .select(
                &self.config.relationship_table,
                Some(&columns),
                &Criteria::new(),
                &order,
                None,
                None,
            )
            .await?;

        Ok(rows.iter().map(relationship_from_row).collect())
    }

    /// Maintenance sweep: relationship rows whose ancestor or child no longer
    /// resolves
    pub async fn find_orphaned_relationships(&self) -> Result<Vec<OrphanedRelationship>> {
        let relationships = self.load_relationships().await?;
        let ancestor_uids = self.load_uid_set(&self.config.ancestor_table).await?;
        let child_uids = self.load_uid_set(&self.config.child_table).await?;

        let orphans = find_orphans(&relationships, &ancestor_uids, &child_uids);
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "found orphaned relationship rows");
        }
        Ok(orphans)
    }

    async fn load_uid_set(&self, table: &str) -> Result<BTreeSet<String>> {
        let columns = vec![UID_COLUMN.to_string()];
        let (rows, _) = self
            .engine
            .select(table, Some(&columns), &Criteria::new(), &[], None, None)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get(UID_COLUMN).and_then(|v| v.as_str()))
            .map(String::from)
            .collect())
    }

    // =========================================================================
    // Aggregate Record Operations
    // =========================================================================

    /// Create an aggregate record owned by the given entity
    pub async fn create_aggregate_record_by_entity_uid(
        &self,
        type_name: &str,
        entity_uid: &str,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mapping = self.aggregates.resolve(type_name)?;
        let props = merge_aggregate_props(&mapping.owner_key, entity_uid, data)?;
        self.engine.insert(&mapping.table, &props).await
    }

    /// Update an aggregate record by uid
    ///
    /// Returns `None` when no record matched the uid. The owning foreign key
    /// cannot be changed through this path.
    pub async fn update_aggregate_record(
        &self,
        type_name: &str,
        uid: &str,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<serde_json::Value>> {
        let mapping = self.aggregates.resolve(type_name)?;

        if data.contains_key(UID_COLUMN) || data.contains_key(&mapping.owner_key) {
            return Err(StoreError::schema_validation(format!(
                "Aggregate data must not set '{}' or '{}'",
                UID_COLUMN, mapping.owner_key
            )));
        }

        self.engine.update(&mapping.table, uid, data).await
    }

    /// Delete an aggregate record by uid
    pub async fn delete_aggregate_record(&self, type_name: &str, uid: &str) -> Result<u64> {
        let mapping = self.aggregates.resolve(type_name)?;
        self.engine.delete(&mapping.table, uid).await
    }

    /// All aggregate records owned by an entity, in the mapping's default
    /// order
    pub async fn list_aggregate_records(
        &self,
        type_name: &str,
        entity_uid: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let mapping = self.aggregates.resolve(type_name)?;
        let criteria = Criteria::new().eq(&mapping.owner_key, entity_uid);
        let order = vec![(mapping.default_order.clone(), SortDirection::Asc)];
        let (rows, _) = self
            .engine
            .select(&mapping.table, None, &criteria, &order, None, None)
            .await?;
        Ok(rows)
    }
}

// =========================================================================
// Internal Helpers
// =========================================================================

/// Check the configured entity-family tables against the registry up front
fn validate_store_tables(schema: &SchemaRegistry, config: &StoreConfig) -> Result<()> {
    for table in [&config.ancestor_table, &config.child_table] {
        let descriptor = schema.require_table(table)?;
        for column in [UID_COLUMN, config.key_column.as_str()] {
            if !descriptor.has_field(column) {
                return Err(StoreError::schema_validation(format!(
                    "Entity table '{}' is missing column '{}'",
                    table, column
                )));
            }
        }
    }

    let relationship = schema.require_table(&config.relationship_table)?;
    for column in [UID_COLUMN, ANCESTOR_COLUMN, CHILD_COLUMN] {
        if !relationship.has_field(column) {
            return Err(StoreError::schema_validation(format!(
                "Relationship table '{}' is missing column '{}'",
                config.relationship_table, column
            )));
        }
    }

    Ok(())
}

/// Translate a row object into the UI-facing entity shape
fn entity_from_row(row: serde_json::Value, key_column: &str) -> Entity {
    let uid = row
        .get(UID_COLUMN)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let key = row
        .get(key_column)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Entity {
        uid,
        key,
        properties: row,
    }
}

fn relationship_from_row(row: &serde_json::Value) -> Relationship {
    let text = |column: &str| {
        row.get(column)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Relationship {
        uid: text(UID_COLUMN),
        ancestor_uid: text(ANCESTOR_COLUMN),
        child_uid: text(CHILD_COLUMN),
    }
}

/// Copy properties with a fresh uid in front; the caller must not supply one
fn with_generated_uid(
    properties: &serde_json::Map<String, serde_json::Value>,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    if properties.contains_key(UID_COLUMN) {
        return Err(StoreError::schema_validation(format!(
            "Property '{}' is generated and cannot be supplied",
            UID_COLUMN
        )));
    }

    let mut props = serde_json::Map::new();
    props.insert(
        UID_COLUMN.to_string(),
        serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
    );
    for (key, value) in properties {
        props.insert(key.clone(), value.clone());
    }
    Ok(props)
}

/// Aggregate record properties: fresh uid, owning key, then the caller's data
fn merge_aggregate_props(
    owner_key: &str,
    entity_uid: &str,
    data: &serde_json::Map<String, serde_json::Value>,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    if data.contains_key(UID_COLUMN) || data.contains_key(owner_key) {
        return Err(StoreError::schema_validation(format!(
            "Aggregate data must not set '{}' or '{}'",
            UID_COLUMN, owner_key
        )));
    }

    let mut props = serde_json::Map::new();
    props.insert(
        UID_COLUMN.to_string(),
        serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
    );
    props.insert(
        owner_key.to_string(),
        serde_json::Value::String(entity_uid.to_string()),
    );
    for (key, value) in data {
        props.insert(key.clone(), value.clone());
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FieldDescriptor, FieldType, TableDescriptor};

    fn store_schema() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        schema
            .register_table(TableDescriptor::new(
                "entities",
                vec![
                    FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                    FieldDescriptor::new("key", FieldType::Text).display(),
                ],
            ))
            .unwrap();
        schema
            .register_table(TableDescriptor::new(
                "child_entities",
                vec![
                    FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                    FieldDescriptor::new("key", FieldType::Text).display(),
                ],
            ))
            .unwrap();
        schema
            .register_table(TableDescriptor::new(
                "entity_relationships",
                vec![
                    FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                    FieldDescriptor::new("ancestor_uid", FieldType::Text),
                    FieldDescriptor::new("child_uid", FieldType::Text),
                ],
            ))
            .unwrap();
        schema
    }

    #[test]
    fn test_validate_store_tables() {
        let schema = store_schema();
        let config = StoreConfig::builder("postgres://localhost/test").build();
        assert!(validate_store_tables(&schema, &config).is_ok());
    }

    #[test]
    fn test_validate_store_tables_missing_relationship_column() {
        let mut schema = SchemaRegistry::new();
        schema
            .register_table(TableDescriptor::new(
                "entities",
                vec![
                    FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                    FieldDescriptor::new("key", FieldType::Text),
                ],
            ))
            .unwrap();
        schema
            .register_table(TableDescriptor::new(
                "child_entities",
                vec![
                    FieldDescriptor::new("uid", FieldType::Text).primary_key(),
                    FieldDescriptor::new("key", FieldType::Text),
                ],
            ))
            .unwrap();
        schema
            .register_table(TableDescriptor::new(
                "entity_relationships",
                vec![FieldDescriptor::new("uid", FieldType::Text).primary_key()],
            ))
            .unwrap();

        let config = StoreConfig::builder("postgres://localhost/test").build();
        let err = validate_store_tables(&schema, &config).unwrap_err();
        assert!(err.to_string().contains("ancestor_uid"));
    }

    #[test]
    fn test_validate_store_tables_unregistered_table() {
        let schema = SchemaRegistry::new();
        let config = StoreConfig::builder("postgres://localhost/test").build();
        assert!(validate_store_tables(&schema, &config).is_err());
    }

    #[test]
    fn test_entity_from_row() {
        let row = serde_json::json!({
            "uid": "u-1",
            "key": "aspirin",
            "mfr": "X",
        });

        let entity = entity_from_row(row, "key");
        assert_eq!(entity.uid, "u-1");
        assert_eq!(entity.key, "aspirin");
        assert_eq!(entity.properties["mfr"], "X");
    }

    #[test]
    fn test_relationship_from_row() {
        let row = serde_json::json!({
            "uid": "r-1",
            "ancestor_uid": "a-1",
            "child_uid": "c-1",
        });

        let relationship = relationship_from_row(&row);
        assert_eq!(relationship.uid, "r-1");
        assert_eq!(relationship.ancestor_uid, "a-1");
        assert_eq!(relationship.child_uid, "c-1");
    }

    #[test]
    fn test_with_generated_uid() {
        let mut data = serde_json::Map::new();
        data.insert("key".to_string(), serde_json::json!("aspirin"));

        let props = with_generated_uid(&data).unwrap();
        let keys: Vec<&String> = props.keys().collect();
        assert_eq!(keys, vec!["uid", "key"]);
        assert!(!props["uid"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_with_generated_uid_rejects_caller_uid() {
        let mut data = serde_json::Map::new();
        data.insert("uid".to_string(), serde_json::json!("mine"));
        assert!(with_generated_uid(&data).is_err());
    }

    #[test]
    fn test_merge_aggregate_props() {
        let mut data = serde_json::Map::new();
        data.insert("route".to_string(), serde_json::json!("oral"));

        let props = merge_aggregate_props("drug_uid", "u-1", &data).unwrap();
        assert_eq!(props["drug_uid"], "u-1");
        assert_eq!(props["route"], "oral");
        assert!(props.contains_key("uid"));
    }

    #[test]
    fn test_merge_aggregate_props_rejects_owner_key() {
        let mut data = serde_json::Map::new();
        data.insert("drug_uid".to_string(), serde_json::json!("other"));
        assert!(merge_aggregate_props("drug_uid", "u-1", &data).is_err());
    }
}

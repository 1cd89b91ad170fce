//! # facet-store
//!
//! A metadata-driven PostgreSQL entity store with faceted distinct-value
//! queries.
//!
//! This crate exposes arbitrary tables through a uniform entity/aggregate
//! model and answers the two queries a filterable UI grid needs: the distinct
//! values one column could take under every *other* active filter, and the
//! paginated distinct rows matching all active filters, with a total count.
//! All dynamic identifiers are validated against an immutable schema registry
//! before they reach SQL text, and all values travel as bind parameters.
//!
//! ## Features
//!
//! - **Schema Registry**: immutable table/field metadata with identifier
//!   allow-listing as the single injection defense
//! - **Aggregate Mappings**: logical aggregate type names resolved to
//!   physical tables through a closed registry
//! - **Dynamic Statements**: parametrized SELECT/INSERT/UPDATE/DELETE from
//!   declarative filter/order/paging specs; array filters compile to
//!   set-membership predicates
//! - **Faceted Queries**: distinct values with self-excluding filters, and
//!   paginated distinct rows carrying their total count
//! - **Entity Repository**: entity/child CRUD, in-memory tree assembly over
//!   a decoupled relationship table, ordered cascading deletes, and
//!   transactional child-entity creation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use facet_store::{
//!     AggregateMapping, AggregateRegistry, EntityStore, FieldDescriptor, FieldType,
//!     FilterMap, SchemaRegistry, StoreConfig, TableDescriptor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut schema = SchemaRegistry::new();
//!     schema.register_table(TableDescriptor::new(
//!         "drugs",
//!         vec![
//!             FieldDescriptor::new("uid", FieldType::Text).primary_key(),
//!             FieldDescriptor::new("key", FieldType::Text).display(),
//!             FieldDescriptor::new("mfr", FieldType::Text),
//!         ],
//!     ))?;
//!     schema.register_table(TableDescriptor::new(
//!         "child_entities",
//!         vec![
//!             FieldDescriptor::new("uid", FieldType::Text).primary_key(),
//!             FieldDescriptor::new("key", FieldType::Text).display(),
//!         ],
//!     ))?;
//!     schema.register_table(TableDescriptor::new(
//!         "entity_relationships",
//!         vec![
//!             FieldDescriptor::new("uid", FieldType::Text).primary_key(),
//!             FieldDescriptor::new("ancestor_uid", FieldType::Text),
//!             FieldDescriptor::new("child_uid", FieldType::Text),
//!         ],
//!     ))?;
//!
//!     let aggregates = AggregateRegistry::new();
//!
//!     let config = StoreConfig::builder("postgres://localhost/mydb")
//!         .ancestor_table("drugs")
//!         .build();
//!     let store = EntityStore::connect(
//!         config,
//!         Arc::new(schema),
//!         Arc::new(aggregates),
//!     )
//!     .await?;
//!
//!     // Values "mfr" could take, given the other active filters
//!     let filters = FilterMap::new().with("key", vec!["Aspirin".to_string()]);
//!     let values = store
//!         .engine()
//!         .distinct_values("drugs", "mfr", &filters)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! Registries are populated once, before any request is served, and are
//! immutable afterward; readers never lock. Every database round trip is a
//! single suspension point, and backpressure is whatever the connection pool
//! provides. Only the repository writes entity, relationship, and aggregate
//! tables.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod filter;
pub mod registry;
pub mod repository;
pub mod sql;

// Re-export main types for convenience
pub use aggregate::{AggregateMapping, AggregateRegistry};
pub use config::{StoreConfig, StoreConfigBuilder};
pub use engine::QueryEngine;
pub use entity::{
    assemble_tree, ChildEntity, Entity, EntityTree, OrphanedRelationship, Relationship,
};
pub use error::{ErrorKind, Result, StoreError};
pub use filter::{Criteria, CriteriaValue, FilterMap, SortDirection};
pub use registry::{FieldDescriptor, FieldType, SchemaRegistry, TableDescriptor};
pub use repository::EntityStore;

// Re-export SQL utilities for advanced users
pub use sql::sanitize::{is_valid_identifier, quote_identifier};

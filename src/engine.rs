//! Query engine: executes built statements against PostgreSQL
//!
//! The engine owns the connection pool and a handle to the schema registry.
//! It never assembles SQL itself; every statement comes from `sql::builder`
//! with identifiers already validated, and every value travels as a bind
//! parameter.

use std::sync::Arc;

use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::{Executor, Postgres, Row};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::{Criteria, FilterMap, SortDirection};
use crate::registry::{FieldDescriptor, FieldType, SchemaRegistry, TableDescriptor};
use crate::sql::builder::{
    self, SqlParam, Statement,
};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Executes dynamic statements against one PostgreSQL database
pub struct QueryEngine {
    /// Database connection pool
    pool: PgPool,
    /// Schema registry handle, read-only after startup
    schema: Arc<SchemaRegistry>,
}

impl QueryEngine {
    /// Connect to the database described by the configuration
    pub async fn connect(config: &StoreConfig, schema: Arc<SchemaRegistry>) -> Result<Self> {
        let pool = PgPool::connect(&config.database_url).await.map_err(|e| {
            StoreError::Connection(format!("Database connection failed: {}", e))
        })?;

        Ok(Self { pool, schema })
    }

    /// Create an engine from an existing pool
    ///
    /// Use this when you already have a connection pool and want to share it.
    pub fn from_pool(pool: PgPool, schema: Arc<SchemaRegistry>) -> Self {
        Self { pool, schema }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a handle to the schema registry
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    // =========================================================================
    // Generic Statement Operations
    // =========================================================================

    /// Run a paged select plus its matching count query
    pub async fn select(
        &self,
        table_name: &str,
        columns: Option<&[String]>,
        criteria: &Criteria,
        order_by: &[(String, SortDirection)],
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<(Vec<serde_json::Value>, i64)> {
        let table = self.schema.require_table(table_name)?;

        let count_stmt = builder::build_count(table, criteria)?;
        let select_stmt =
            builder::build_select(table, columns, criteria, order_by, limit, offset)?;

        let (total,): (i64,) = bind_count_statement(&count_stmt).fetch_one(&self.pool).await?;

        debug!(table = table_name, sql = %select_stmt.sql, "executing select");
        let rows = bind_statement(&select_stmt).fetch_all(&self.pool).await?;

        let fields = selected_fields(table, columns);
        let data = rows.iter().map(|row| row_to_json(row, &fields)).collect();

        Ok((data, total))
    }

    /// Insert a row, echoing its exportable fields
    ///
    /// Property keys must name existing columns and values must match the
    /// declared field types; unknown keys are rejected before any query runs.
    pub async fn insert(
        &self,
        table_name: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.insert_with(&self.pool, table_name, properties).await
    }

    /// Insert through an explicit executor (e.g. an open transaction)
    pub async fn insert_with<'e, E>(
        &self,
        executor: E,
        table_name: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let table = self.schema.require_table(table_name)?;
        let columns = validate_properties(table, properties)?;
        let stmt = builder::build_insert(table, &columns)?;

        let mut query = sqlx::query(&stmt.sql);
        for column in &columns {
            let field = table.field(column).ok_or_else(|| {
                StoreError::schema_validation(format!("Unknown column '{}'", column))
            })?;
            query = bind_property(query, &field.field_type, column, &properties[column])?;
        }

        debug!(table = table_name, sql = %stmt.sql, "executing insert");
        let row = query.fetch_one(executor).await?;

        let fields = table.exportable_fields();
        Ok(row_to_json(&row, &fields))
    }

    /// Update a row by uid, echoing its exportable fields
    ///
    /// Returns `None` when no row matched the uid.
    pub async fn update(
        &self,
        table_name: &str,
        uid: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<serde_json::Value>> {
        let table = self.schema.require_table(table_name)?;
        let columns = validate_properties(table, properties)?;
        let stmt = builder::build_update(table, &columns)?;

        let mut query = sqlx::query(&stmt.sql).bind(uid.to_string());
        for column in &columns {
            let field = table.field(column).ok_or_else(|| {
                StoreError::schema_validation(format!("Unknown column '{}'", column))
            })?;
            query = bind_property(query, &field.field_type, column, &properties[column])?;
        }

        debug!(table = table_name, uid, sql = %stmt.sql, "executing update");
        let row = query.fetch_optional(&self.pool).await?;

        let fields = table.exportable_fields();
        Ok(row.map(|row| row_to_json(&row, &fields)))
    }

    /// Delete a row by uid, returning the number of rows affected
    pub async fn delete(&self, table_name: &str, uid: &str) -> Result<u64> {
        self.delete_with(&self.pool, table_name, uid).await
    }

    /// Delete through an explicit executor (e.g. an open transaction)
    pub async fn delete_with<'e, E>(&self, executor: E, table_name: &str, uid: &str) -> Result<u64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let table = self.schema.require_table(table_name)?;
        let stmt = builder::build_delete(table)?;

        debug!(table = table_name, uid, sql = %stmt.sql, "executing delete");
        let result = sqlx::query(&stmt.sql)
            .bind(uid.to_string())
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete all rows matching the criteria, returning the number removed
    pub async fn delete_where(&self, table_name: &str, criteria: &Criteria) -> Result<u64> {
        let table = self.schema.require_table(table_name)?;
        let stmt = builder::build_delete_where(table, criteria)?;

        debug!(table = table_name, sql = %stmt.sql, "executing delete");
        let result = bind_statement(&stmt).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Distinct-Value / Distinct-Row Operations
    // =========================================================================

    /// Distinct values of one column under all filters except its own
    ///
    /// Values come back string-coerced, ordered, NULLs excluded by the query
    /// and empty strings dropped here.
    pub async fn distinct_values(
        &self,
        table_name: &str,
        target_column: &str,
        filters: &FilterMap,
    ) -> Result<Vec<String>> {
        let table = self.schema.require_table(table_name)?;
        let stmt = builder::build_distinct_values(table, target_column, filters)?;

        debug!(table = table_name, column = target_column, sql = %stmt.sql, "executing distinct values");
        let rows = bind_statement(&stmt).fetch_all(&self.pool).await?;

        let values = rows
            .iter()
            .filter_map(|row| row.try_get::<Option<String>, _>("value").ok().flatten())
            .filter(|value| !value.is_empty())
            .collect();

        Ok(values)
    }

    /// Paged distinct rows over the requested columns, plus the total
    /// distinct-row count
    ///
    /// Every returned row carries the same `totalRows` annotation. An offset
    /// past the end yields an empty page with the count still accurate.
    pub async fn distinct_rows(
        &self,
        table_name: &str,
        columns: &[String],
        filters: &FilterMap,
        offset: i64,
        limit: i64,
        order_by: Option<&str>,
    ) -> Result<(Vec<serde_json::Value>, i64)> {
        let table = self.schema.require_table(table_name)?;
        let stmt =
            builder::build_distinct_rows(table, columns, filters, order_by, offset, limit)?;

        debug!(table = table_name, sql = %stmt.sql, "executing distinct rows");
        let rows = bind_statement(&stmt).fetch_all(&self.pool).await?;

        let total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("total_rows").unwrap_or(0),
            // Empty page: the window count is unavailable, so ask separately
            None => {
                let count_stmt = builder::build_distinct_count(table, columns, filters)?;
                let (count,): (i64,) =
                    bind_count_statement(&count_stmt).fetch_one(&self.pool).await?;
                count
            }
        };

        let data = rows
            .iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for column in columns {
                    let value = row
                        .try_get::<Option<String>, _>(column.as_str())
                        .ok()
                        .flatten()
                        .map(serde_json::Value::String)
                        .unwrap_or(serde_json::Value::Null);
                    object.insert(column.clone(), value);
                }
                object.insert(
                    "totalRows".to_string(),
                    serde_json::Value::Number(total.into()),
                );
                serde_json::Value::Object(object)
            })
            .collect();

        Ok((data, total))
    }
}

// =========================================================================
// Internal Helpers
// =========================================================================

/// Validate property keys and value types against a table descriptor,
/// returning the ordered column list to bind
fn validate_properties(
    table: &TableDescriptor,
    properties: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<String>> {
    let mut columns = Vec::with_capacity(properties.len());

    for (key, value) in properties {
        let field = table.field(key).ok_or_else(|| {
            StoreError::schema_validation(format!(
                "Unknown property '{}' for table '{}'",
                key, table.name
            ))
        })?;

        if let Err(e) = field.field_type.validate_value(value) {
            return Err(StoreError::schema_validation(format!(
                "Invalid value for column '{}': {}",
                key, e
            )));
        }

        columns.push(key.clone());
    }

    Ok(columns)
}

/// Resolve the field descriptors a select decodes, in select-list order
fn selected_fields<'a>(
    table: &'a TableDescriptor,
    columns: Option<&[String]>,
) -> Vec<&'a FieldDescriptor> {
    match columns {
        Some(requested) => requested.iter().filter_map(|c| table.field(c)).collect(),
        None => table.exportable_fields(),
    }
}

/// Bind a built statement's parameters onto a fresh query
fn bind_statement(stmt: &Statement) -> PgQuery<'_> {
    let mut query = sqlx::query(&stmt.sql);
    for param in &stmt.params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::TextArray(v) => query.bind(v.clone()),
            SqlParam::Int(i) => query.bind(*i),
        };
    }
    query
}

/// Bind a built statement's parameters onto a scalar count query
fn bind_count_statement(
    stmt: &Statement,
) -> sqlx::query::QueryAs<'_, Postgres, (i64,), PgArguments> {
    let mut query = sqlx::query_as::<_, (i64,)>(&stmt.sql);
    for param in &stmt.params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::TextArray(v) => query.bind(v.clone()),
            SqlParam::Int(i) => query.bind(*i),
        };
    }
    query
}

/// Bind one property value with the column's declared type
fn bind_property<'q>(
    query: PgQuery<'q>,
    field_type: &FieldType,
    column: &str,
    value: &serde_json::Value,
) -> Result<PgQuery<'q>> {
    Ok(match field_type {
        FieldType::Text => {
            if value.is_null() {
                query.bind(None::<String>)
            } else {
                let text = value.as_str().ok_or_else(|| {
                    StoreError::schema_validation(format!("Column '{}' expected string", column))
                })?;
                query.bind(text.to_string())
            }
        }
        FieldType::Integer => {
            if value.is_null() {
                query.bind(None::<i64>)
            } else {
                let int_val = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
                    .ok_or_else(|| {
                        StoreError::schema_validation(format!(
                            "Column '{}' expected integer",
                            column
                        ))
                    })?;
                query.bind(int_val)
            }
        }
        FieldType::Decimal => {
            if value.is_null() {
                query.bind(None::<f64>)
            } else {
                let dec_val = value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
                    .ok_or_else(|| {
                        StoreError::schema_validation(format!(
                            "Column '{}' expected decimal",
                            column
                        ))
                    })?;
                query.bind(dec_val)
            }
        }
        FieldType::Boolean => {
            if value.is_null() {
                query.bind(None::<bool>)
            } else {
                let bool_val = value.as_bool().ok_or_else(|| {
                    StoreError::schema_validation(format!(
                        "Column '{}' expected boolean",
                        column
                    ))
                })?;
                query.bind(bool_val)
            }
        }
        FieldType::Timestamp => {
            if value.is_null() {
                query.bind(None::<chrono::DateTime<chrono::Utc>>)
            } else {
                let text = value.as_str().ok_or_else(|| {
                    StoreError::schema_validation(format!(
                        "Column '{}' expected timestamp string",
                        column
                    ))
                })?;
                let timestamp = chrono::DateTime::parse_from_rfc3339(text)
                    .map_err(|e| {
                        StoreError::schema_validation(format!(
                            "Column '{}' has invalid timestamp: {}",
                            column, e
                        ))
                    })?
                    .with_timezone(&chrono::Utc);
                query.bind(timestamp)
            }
        }
        FieldType::Json => query.bind(value.clone()),
    })
}

/// Decode a row into a JSON object over the given fields, in order
pub(crate) fn row_to_json(row: &PgRow, fields: &[&FieldDescriptor]) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for field in fields {
        object.insert(field.name.clone(), extract_field_value(row, field));
    }
    serde_json::Value::Object(object)
}

fn extract_field_value(row: &PgRow, field: &FieldDescriptor) -> serde_json::Value {
    let name = field.name.as_str();
    match &field.field_type {
        FieldType::Text => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
        FieldType::Integer => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::Number(v.into()))
            .unwrap_or(serde_json::Value::Null),
        FieldType::Decimal => {
            use rust_decimal::prelude::ToPrimitive;
            row.try_get::<Option<rust_decimal::Decimal>, _>(name)
                .ok()
                .flatten()
                .and_then(|d| d.to_f64())
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)
        }
        FieldType::Boolean => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .map(serde_json::Value::Bool)
            .unwrap_or(serde_json::Value::Null),
        FieldType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.to_rfc3339()))
            .unwrap_or(serde_json::Value::Null),
        FieldType::Json => row
            .try_get::<Option<serde_json::Value>, _>(name)
            .ok()
            .flatten()
            .unwrap_or(serde_json::Value::Null),
    }
}

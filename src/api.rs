//! Request and response shapes for the HTTP-layer collaborator
//!
//! The routing layer itself lives outside this crate; these types pin down
//! the wire contract and perform the boundary conversion from untyped JSON
//! into the validated filter/criteria shapes the engine consumes.

use serde::{Deserialize, Serialize};

use crate::entity::EntityTree;
use crate::error::{Result, StoreError};
use crate::filter::{Criteria, FilterMap, SortDirection};

fn default_offset() -> i64 {
    0
}

fn default_limit() -> i64 {
    100
}

/// `POST /select` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub table: String,
    /// Columns to return; defaults to the table's exportable fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    /// Column to scalar, null, or array of scalars
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub criteria: Option<serde_json::Value>,
    /// Column to sort direction ("asc" | "desc"), applied in given order
    #[serde(rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl SelectRequest {
    /// Convert the `where` object into validated criteria
    pub fn to_criteria(&self) -> Result<Criteria> {
        match &self.criteria {
            Some(value) => Criteria::from_json(value),
            None => Ok(Criteria::new()),
        }
    }

    /// Convert the `orderBy` object into validated column/direction pairs
    pub fn to_order_by(&self) -> Result<Vec<(String, SortDirection)>> {
        let Some(order_by) = &self.order_by else {
            return Ok(Vec::new());
        };

        let mut pairs = Vec::with_capacity(order_by.len());
        for (column, direction) in order_by {
            let direction = direction.as_str().ok_or_else(|| {
                StoreError::schema_validation(format!(
                    "Sort direction for column '{}' must be a string",
                    column
                ))
            })?;
            pairs.push((column.clone(), SortDirection::parse(direction)?));
        }
        Ok(pairs)
    }
}

/// `POST /select` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResponse {
    pub data: Vec<serde_json::Value>,
    pub count: i64,
}

/// `POST /create` request: either a table row or an aggregate record
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CreateRequest {
    /// `{entityUid, aggregateType, ...data}`
    Aggregate {
        #[serde(rename = "entityUid")]
        entity_uid: String,
        #[serde(rename = "aggregateType")]
        aggregate_type: String,
        #[serde(flatten)]
        data: serde_json::Map<String, serde_json::Value>,
    },
    /// `{table, properties}`
    Table {
        table: String,
        properties: serde_json::Map<String, serde_json::Value>,
    },
}

/// `POST /create` response for the aggregate path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub success: bool,
    pub id: String,
}

/// `POST /update` request: either a table row or an aggregate record
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpdateRequest {
    /// `{aggregateType, uid, ...data}`
    Aggregate {
        #[serde(rename = "aggregateType")]
        aggregate_type: String,
        uid: String,
        #[serde(flatten)]
        data: serde_json::Map<String, serde_json::Value>,
    },
    /// `{table, uid, properties}`
    Table {
        table: String,
        uid: String,
        properties: serde_json::Map<String, serde_json::Value>,
    },
}

/// `DELETE /delete` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub table: String,
    pub uid: String,
}

/// `DELETE /delete` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(rename = "rowsAffected")]
    pub rows_affected: u64,
}

/// `POST /distinct-values` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctValuesRequest {
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "columnName")]
    pub column_name: String,
    #[serde(default)]
    pub filters: serde_json::Value,
}

impl DistinctValuesRequest {
    /// Convert the filters object into a validated filter map
    pub fn to_filter_map(&self) -> Result<FilterMap> {
        if self.filters.is_null() {
            return Ok(FilterMap::new());
        }
        FilterMap::from_json(&self.filters)
    }
}

/// `POST /distinct-values` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctValuesResponse {
    pub values: Vec<String>,
    #[serde(rename = "columnName")]
    pub column_name: String,
}

/// `POST /distinct-rows` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctRowsRequest {
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "columnList")]
    pub column_list: Vec<String>,
    #[serde(default)]
    pub filters: serde_json::Value,
    #[serde(default = "default_offset")]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

impl DistinctRowsRequest {
    /// Convert the filters object into a validated filter map
    pub fn to_filter_map(&self) -> Result<FilterMap> {
        if self.filters.is_null() {
            return Ok(FilterMap::new());
        }
        FilterMap::from_json(&self.filters)
    }
}

/// `POST /distinct-rows` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctRowsResponse {
    pub data: Vec<serde_json::Value>,
    pub columns: Vec<String>,
    #[serde(rename = "totalRows")]
    pub total_rows: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Tree endpoint response
pub type TreeResponse = EntityTree;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_request_conversion() {
        let request: SelectRequest = serde_json::from_value(serde_json::json!({
            "table": "drugs",
            "properties": ["name", "mfr"],
            "where": { "mfr": ["X", "Y"] },
            "orderBy": { "name": "desc" },
            "limit": 10,
        }))
        .unwrap();

        assert_eq!(request.table, "drugs");
        assert!(request.to_criteria().is_ok());

        let order = request.to_order_by().unwrap();
        assert_eq!(order, vec![("name".to_string(), SortDirection::Desc)]);
    }

    #[test]
    fn test_select_request_rejects_bad_direction() {
        let request: SelectRequest = serde_json::from_value(serde_json::json!({
            "table": "drugs",
            "orderBy": { "name": "descending" },
        }))
        .unwrap();

        assert!(request.to_order_by().is_err());
    }

    #[test]
    fn test_create_request_discrimination() {
        let aggregate: CreateRequest = serde_json::from_value(serde_json::json!({
            "entityUid": "u-1",
            "aggregateType": "GenericRoute",
            "route": "oral",
        }))
        .unwrap();
        match aggregate {
            CreateRequest::Aggregate {
                entity_uid,
                aggregate_type,
                data,
            } => {
                assert_eq!(entity_uid, "u-1");
                assert_eq!(aggregate_type, "GenericRoute");
                assert_eq!(data["route"], "oral");
            }
            CreateRequest::Table { .. } => panic!("expected aggregate request"),
        }

        let table: CreateRequest = serde_json::from_value(serde_json::json!({
            "table": "drugs",
            "properties": { "key": "aspirin" },
        }))
        .unwrap();
        assert!(matches!(table, CreateRequest::Table { .. }));
    }

    #[test]
    fn test_update_request_discrimination() {
        let aggregate: UpdateRequest = serde_json::from_value(serde_json::json!({
            "aggregateType": "GenericRoute",
            "uid": "r-1",
            "route": "topical",
        }))
        .unwrap();
        assert!(matches!(aggregate, UpdateRequest::Aggregate { .. }));

        let table: UpdateRequest = serde_json::from_value(serde_json::json!({
            "table": "drugs",
            "uid": "u-1",
            "properties": { "mfr": "Z" },
        }))
        .unwrap();
        assert!(matches!(table, UpdateRequest::Table { .. }));
    }

    #[test]
    fn test_distinct_values_request_filters() {
        let request: DistinctValuesRequest = serde_json::from_value(serde_json::json!({
            "tableName": "drugs",
            "columnName": "name",
            "filters": { "mfr": ["X"] },
        }))
        .unwrap();

        let map = request.to_filter_map().unwrap();
        assert_eq!(map.get("mfr").unwrap(), ["X"]);

        // Absent filters default to unconstrained
        let request: DistinctValuesRequest = serde_json::from_value(serde_json::json!({
            "tableName": "drugs",
            "columnName": "name",
        }))
        .unwrap();
        assert!(request.to_filter_map().unwrap().is_unconstrained());
    }

    #[test]
    fn test_distinct_rows_request_defaults() {
        let request: DistinctRowsRequest = serde_json::from_value(serde_json::json!({
            "tableName": "drugs",
            "columnList": ["name", "mfr"],
        }))
        .unwrap();

        assert_eq!(request.offset, 0);
        assert_eq!(request.limit, 100);
        assert!(request.order_by.is_none());
    }

    #[test]
    fn test_response_wire_names() {
        let response = DistinctRowsResponse {
            data: Vec::new(),
            columns: vec!["name".to_string()],
            total_rows: 42,
            offset: 0,
            limit: 10,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["totalRows"], 42);

        let delete = DeleteResponse {
            success: true,
            rows_affected: 3,
        };
        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["rowsAffected"], 3);
    }
}

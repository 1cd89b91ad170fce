//! Caller-supplied filter shapes
//!
//! `FilterMap` is the per-column accepted-value map driving the distinct-value
//! and distinct-row queries. `Criteria` is the where-map for generic selects.
//! Both are converted from untyped JSON at the boundary; anything that is not
//! a scalar or an array of scalars is rejected rather than coerced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Sort direction for an order-by column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse from the wire form; accepts exactly `asc` or `desc`
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(StoreError::schema_validation(format!(
                "Invalid sort direction '{}'. Must be 'asc' or 'desc'.",
                other
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Convert a scalar JSON value to its filter string form
pub(crate) fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Mapping from column name to the ordered set of accepted values
///
/// An absent entry, or an entry with an empty value set, means "no constraint
/// on that column". Values are strings; scalar filter values are stringified
/// at the boundary. Insertion order of values is preserved and duplicates are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl FilterMap {
    /// Create an empty filter map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accepted values for a column, deduplicating while keeping the
    /// caller's order
    pub fn insert(&mut self, column: impl Into<String>, values: Vec<String>) {
        let mut deduped = Vec::with_capacity(values.len());
        for value in values {
            if !deduped.contains(&value) {
                deduped.push(value);
            }
        }
        self.entries.insert(column.into(), deduped);
    }

    /// Builder-style `insert`
    pub fn with(mut self, column: impl Into<String>, values: Vec<String>) -> Self {
        self.insert(column, values);
        self
    }

    /// Convert from the wire shape: a JSON object mapping column names to a
    /// scalar or an array of scalars
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::schema_validation("Filters must be a JSON object")
        })?;

        let mut map = Self::new();
        for (column, entry) in object {
            match entry {
                serde_json::Value::Null => map.insert(column.clone(), Vec::new()),
                serde_json::Value::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        let value = scalar_to_string(item).ok_or_else(|| {
                            StoreError::schema_validation(format!(
                                "Filter for column '{}' contains a non-scalar value",
                                column
                            ))
                        })?;
                        values.push(value);
                    }
                    map.insert(column.clone(), values);
                }
                scalar => {
                    let value = scalar_to_string(scalar).ok_or_else(|| {
                        StoreError::schema_validation(format!(
                            "Filter for column '{}' must be a scalar or an array of scalars",
                            column
                        ))
                    })?;
                    map.insert(column.clone(), vec![value]);
                }
            }
        }
        Ok(map)
    }

    /// Accepted values for a column, if any entry exists
    pub fn get(&self, column: &str) -> Option<&[String]> {
        self.entries.get(column).map(Vec::as_slice)
    }

    /// Entries that actually constrain a column: non-empty value sets, with
    /// the excluded column (if any) skipped
    pub fn active_entries<'a>(
        &'a self,
        exclude: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a [String])> {
        self.entries
            .iter()
            .filter(move |(column, values)| {
                !values.is_empty() && Some(column.as_str()) != exclude
            })
            .map(|(column, values)| (column.as_str(), values.as_slice()))
    }

    /// Whether no entry constrains any column
    pub fn is_unconstrained(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// All column names mentioned in the map, constrained or not
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// One predicate value in a generic select's where-map
#[derive(Debug, Clone, PartialEq)]
pub enum CriteriaValue {
    /// Column equals the value (text comparison)
    Eq(String),
    /// Column is NULL
    IsNull,
    /// Column is any of the values (set membership, not repeated ORs)
    AnyOf(Vec<String>),
    /// Case-insensitive substring match on the column
    Contains(String),
}

/// Where-map for generic selects: column name to predicate value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    entries: BTreeMap<String, CriteriaValue>,
}

impl Criteria {
    /// Create an empty criteria map
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column = value`
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(column.into(), CriteriaValue::Eq(value.into()));
        self
    }

    /// Require `column IS NULL`
    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.entries.insert(column.into(), CriteriaValue::IsNull);
        self
    }

    /// Require `column = ANY(values)`
    pub fn any_of(mut self, column: impl Into<String>, values: Vec<String>) -> Self {
        self.entries.insert(column.into(), CriteriaValue::AnyOf(values));
        self
    }

    /// Require a case-insensitive substring match
    pub fn contains(mut self, column: impl Into<String>, term: impl Into<String>) -> Self {
        self.entries
            .insert(column.into(), CriteriaValue::Contains(term.into()));
        self
    }

    /// Convert from the wire shape: a JSON object mapping column names to a
    /// scalar, null, or an array of scalars
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::schema_validation("Where clause must be a JSON object")
        })?;

        let mut criteria = Self::new();
        for (column, entry) in object {
            let value = match entry {
                serde_json::Value::Null => CriteriaValue::IsNull,
                serde_json::Value::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        let value = scalar_to_string(item).ok_or_else(|| {
                            StoreError::schema_validation(format!(
                                "Where value for column '{}' contains a non-scalar element",
                                column
                            ))
                        })?;
                        values.push(value);
                    }
                    CriteriaValue::AnyOf(values)
                }
                scalar => CriteriaValue::Eq(scalar_to_string(scalar).ok_or_else(|| {
                    StoreError::schema_validation(format!(
                        "Where value for column '{}' must be a scalar, null, or an array",
                        column
                    ))
                })?),
            };
            criteria.entries.insert(column.clone(), value);
        }
        Ok(criteria)
    }

    /// Iterate entries in deterministic (column name) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CriteriaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether no predicate is present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("asc").unwrap(), SortDirection::Asc);
        assert_eq!(SortDirection::parse("desc").unwrap(), SortDirection::Desc);
        assert!(SortDirection::parse("ASC").is_err());
        assert!(SortDirection::parse("ascending").is_err());
        assert!(SortDirection::parse("").is_err());
    }

    #[test]
    fn test_filter_map_from_json() {
        let map = FilterMap::from_json(&serde_json::json!({
            "mfr": ["X", "Y"],
            "name": "A",
            "strength": 20,
            "empty": [],
        }))
        .unwrap();

        assert_eq!(map.get("mfr").unwrap(), ["X", "Y"]);
        assert_eq!(map.get("name").unwrap(), ["A"]);
        assert_eq!(map.get("strength").unwrap(), ["20"]);
        assert_eq!(map.get("empty").unwrap(), Vec::<String>::new().as_slice());
    }

    #[test]
    fn test_filter_map_rejects_nested_values() {
        assert!(FilterMap::from_json(&serde_json::json!({"a": {"nested": true}})).is_err());
        assert!(FilterMap::from_json(&serde_json::json!({"a": [["x"]]})).is_err());
        assert!(FilterMap::from_json(&serde_json::json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_filter_map_dedup_preserves_order() {
        let mut map = FilterMap::new();
        map.insert("mfr", vec!["Y".into(), "X".into(), "Y".into(), "X".into()]);
        assert_eq!(map.get("mfr").unwrap(), ["Y", "X"]);
    }

    #[test]
    fn test_active_entries_excludes_target_and_empty() {
        let map = FilterMap::new()
            .with("a", vec!["x".into()])
            .with("b", vec!["y".into()])
            .with("c", vec![]);

        let with_exclusion: Vec<&str> =
            map.active_entries(Some("a")).map(|(col, _)| col).collect();
        assert_eq!(with_exclusion, vec!["b"]);

        let without: Vec<&str> = map.active_entries(None).map(|(col, _)| col).collect();
        assert_eq!(without, vec!["a", "b"]);
    }

    #[test]
    fn test_unconstrained() {
        assert!(FilterMap::new().is_unconstrained());
        assert!(FilterMap::new().with("a", vec![]).is_unconstrained());
        assert!(!FilterMap::new().with("a", vec!["x".into()]).is_unconstrained());
    }

    #[test]
    fn test_criteria_from_json() {
        let criteria = Criteria::from_json(&serde_json::json!({
            "uid": "abc",
            "mfr": ["X", "Y"],
            "retired_on": null,
        }))
        .unwrap();

        let entries: Vec<(&str, &CriteriaValue)> = criteria.iter().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            criteria.iter().find(|(c, _)| *c == "uid").unwrap().1,
            &CriteriaValue::Eq("abc".to_string())
        );
        assert_eq!(
            criteria.iter().find(|(c, _)| *c == "retired_on").unwrap().1,
            &CriteriaValue::IsNull
        );
    }

    #[test]
    fn test_criteria_rejects_non_scalar() {
        assert!(Criteria::from_json(&serde_json::json!({"a": {"x": 1}})).is_err());
    }
}

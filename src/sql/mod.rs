//! SQL utilities for facet-store
//!
//! Provides statement building and identifier sanitization.

pub mod builder;
pub mod sanitize;

pub use builder::{
    Statement, SqlParam, build_count, build_criteria_clause, build_delete,
    build_delete_where, build_distinct_count, build_distinct_rows, build_distinct_values,
    build_filter_conjunction, build_insert, build_order_by, build_select,
    MAX_PAGE_LIMIT, UID_COLUMN,
};
pub use sanitize::{is_valid_identifier, quote_identifier};

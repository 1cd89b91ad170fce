//! Parametrized statement construction
//!
//! Turns validated identifiers plus declarative filter/order/paging specs into
//! SQL text with `$n` placeholders and an ordered bind list. Values are never
//! concatenated into statement text; identifiers are interpolated only after
//! passing the allow-list and an existence check against the table descriptor.
//!
//! Comparisons are performed on the text form of the column (`"col"::text`)
//! so one filter pipeline serves every column type of a wide denormalized
//! view.

use crate::error::{Result, StoreError};
use crate::filter::{Criteria, CriteriaValue, FilterMap, SortDirection};
use crate::registry::TableDescriptor;
use crate::sql::sanitize::{is_valid_identifier, quote_identifier};

/// Column holding the stable row identifier in every table the repository
/// writes to
pub const UID_COLUMN: &str = "uid";

/// Upper bound on a distinct-row page
pub const MAX_PAGE_LIMIT: i64 = 10_000;

/// One bind value for a built statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
}

/// A built statement: SQL text plus its ordered bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

fn validate_column(table: &TableDescriptor, column: &str) -> Result<()> {
    if !is_valid_identifier(column) {
        return Err(StoreError::schema_validation(format!(
            "Invalid column name '{}'",
            column
        )));
    }
    if !table.has_field(column) {
        return Err(StoreError::schema_validation(format!(
            "Unknown column '{}' on table '{}'",
            column, table.name
        )));
    }
    Ok(())
}

/// Escape LIKE wildcards in a caller-supplied search term
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Build the WHERE conjunction for a generic select
///
/// Returns the clause (or `TRUE` when no predicate applies) plus bind values.
/// `param_idx` tracks the next available placeholder number.
pub fn build_criteria_clause(
    table: &TableDescriptor,
    criteria: &Criteria,
    param_idx: &mut usize,
) -> Result<(String, Vec<SqlParam>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (column, value) in criteria.iter() {
        validate_column(table, column)?;
        let quoted = quote_identifier(column);

        match value {
            CriteriaValue::Eq(text) => {
                clauses.push(format!("{}::text = ${}::text", quoted, param_idx));
                params.push(SqlParam::Text(text.clone()));
                *param_idx += 1;
            }
            CriteriaValue::IsNull => {
                clauses.push(format!("{} IS NULL", quoted));
            }
            CriteriaValue::AnyOf(values) => {
                // An empty selection means the column is unconstrained
                if values.is_empty() {
                    continue;
                }
                clauses.push(format!("{}::text = ANY(${})", quoted, param_idx));
                params.push(SqlParam::TextArray(values.clone()));
                *param_idx += 1;
            }
            CriteriaValue::Contains(term) => {
                clauses.push(format!("{}::text ILIKE ${}::text", quoted, param_idx));
                params.push(SqlParam::Text(format!("%{}%", escape_like(term))));
                *param_idx += 1;
            }
        }
    }

    if clauses.is_empty() {
        return Ok(("TRUE".to_string(), params));
    }

    Ok((clauses.join(" AND "), params))
}

/// Build the conjunction of set-membership predicates from a filter map
///
/// One `"col"::text = ANY($n)` predicate per entry with a non-empty value
/// set. The column named by `exclude` is skipped entirely, so a distinct-value
/// query sees every value its target column could take under the *other*
/// active filters. Every referenced column must exist and be filterable.
pub fn build_filter_conjunction(
    table: &TableDescriptor,
    filters: &FilterMap,
    exclude: Option<&str>,
    param_idx: &mut usize,
) -> Result<(String, Vec<SqlParam>)> {
    for column in filters.columns() {
        validate_column(table, column)?;
        if table.field(column).is_some_and(|f| !f.filterable) {
            return Err(StoreError::schema_validation(format!(
                "Column '{}' on table '{}' is not filterable",
                column, table.name
            )));
        }
    }

    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (column, values) in filters.active_entries(exclude) {
        clauses.push(format!(
            "{}::text = ANY(${})",
            quote_identifier(column),
            param_idx
        ));
        params.push(SqlParam::TextArray(values.to_vec()));
        *param_idx += 1;
    }

    if clauses.is_empty() {
        return Ok(("TRUE".to_string(), params));
    }

    Ok((clauses.join(" AND "), params))
}

/// Build the ORDER BY clause (without the `ORDER BY` prefix)
pub fn build_order_by(
    table: &TableDescriptor,
    order_by: &[(String, SortDirection)],
) -> Result<String> {
    let mut parts = Vec::with_capacity(order_by.len());
    for (column, direction) in order_by {
        validate_column(table, column)?;
        parts.push(format!("{} {}", quote_identifier(column), direction.as_sql()));
    }
    Ok(parts.join(", "))
}

/// Build a paged SELECT over the given columns (exportable fields when
/// `columns` is `None`)
pub fn build_select(
    table: &TableDescriptor,
    columns: Option<&[String]>,
    criteria: &Criteria,
    order_by: &[(String, SortDirection)],
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Statement> {
    let select_columns: Vec<String> = match columns {
        Some(requested) => {
            if requested.is_empty() {
                return Err(StoreError::schema_validation(
                    "At least one column must be selected",
                ));
            }
            for column in requested {
                validate_column(table, column)?;
            }
            requested.iter().map(|c| quote_identifier(c)).collect()
        }
        None => table
            .exportable_fields()
            .iter()
            .map(|f| quote_identifier(&f.name))
            .collect(),
    };

    let mut param_idx = 1;
    let (where_clause, mut params) = build_criteria_clause(table, criteria, &mut param_idx)?;

    let mut sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_columns.join(", "),
        quote_identifier(&table.name),
        where_clause
    );

    if !order_by.is_empty() {
        sql.push_str(&format!(" ORDER BY {}", build_order_by(table, order_by)?));
    }

    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT ${}", param_idx));
        params.push(SqlParam::Int(limit.max(0)));
        param_idx += 1;
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET ${}", param_idx));
        params.push(SqlParam::Int(offset.max(0)));
    }

    Ok(Statement { sql, params })
}

/// Build the matching COUNT(*) statement for a select
pub fn build_count(table: &TableDescriptor, criteria: &Criteria) -> Result<Statement> {
    let mut param_idx = 1;
    let (where_clause, params) = build_criteria_clause(table, criteria, &mut param_idx)?;

    Ok(Statement {
        sql: format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_identifier(&table.name),
            where_clause
        ),
        params,
    })
}

/// Build the distinct-value query for one column
///
/// All filters except the target column's own apply; NULLs are excluded and
/// results come back ordered by value.
pub fn build_distinct_values(
    table: &TableDescriptor,
    target_column: &str,
    filters: &FilterMap,
) -> Result<Statement> {
    validate_column(table, target_column)?;

    let mut param_idx = 1;
    let (conjunction, params) =
        build_filter_conjunction(table, filters, Some(target_column), &mut param_idx)?;

    let quoted_target = quote_identifier(target_column);
    let sql = format!(
        "SELECT DISTINCT {}::text AS value FROM {} WHERE {} AND {} IS NOT NULL ORDER BY value",
        quoted_target,
        quote_identifier(&table.name),
        conjunction,
        quoted_target
    );

    Ok(Statement { sql, params })
}

/// Build the paged distinct-row query over the requested columns
///
/// The distinct set is computed over exactly the requested columns; the total
/// distinct count rides along on every page row via a window count over the
/// distinct subquery, so paging never needs a second round trip. The order
/// column defaults to the first requested column and must be one of the
/// requested columns. `offset` is clamped to `>= 0`, `limit` to
/// `[1, MAX_PAGE_LIMIT]`.
pub fn build_distinct_rows(
    table: &TableDescriptor,
    columns: &[String],
    filters: &FilterMap,
    order_by: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<Statement> {
    if columns.is_empty() {
        return Err(StoreError::schema_validation(
            "At least one column must be requested",
        ));
    }
    for column in columns {
        validate_column(table, column)?;
    }

    let order_column = order_by.unwrap_or_else(|| columns[0].as_str());
    if !columns.iter().any(|c| c.as_str() == order_column) {
        return Err(StoreError::schema_validation(format!(
            "Order column '{}' must be one of the requested columns",
            order_column
        )));
    }

    let mut param_idx = 1;
    let (conjunction, mut params) =
        build_filter_conjunction(table, filters, None, &mut param_idx)?;

    let select_list: Vec<String> = columns
        .iter()
        .map(|c| {
            let quoted = quote_identifier(c);
            format!("{}::text AS {}", quoted, quoted)
        })
        .collect();

    let sql = format!(
        "SELECT d.*, COUNT(*) OVER () AS total_rows FROM (SELECT DISTINCT {} FROM {} WHERE {}) AS d ORDER BY d.{} ASC LIMIT ${} OFFSET ${}",
        select_list.join(", "),
        quote_identifier(&table.name),
        conjunction,
        quote_identifier(order_column),
        param_idx,
        param_idx + 1
    );

    params.push(SqlParam::Int(limit.clamp(1, MAX_PAGE_LIMIT)));
    params.push(SqlParam::Int(offset.max(0)));

    Ok(Statement { sql, params })
}

/// Build the total-count query for a distinct-row request
///
/// Used when a page comes back empty (offset past the end) and the window
/// count is unavailable; the total must still be reported accurately.
pub fn build_distinct_count(
    table: &TableDescriptor,
    columns: &[String],
    filters: &FilterMap,
) -> Result<Statement> {
    if columns.is_empty() {
        return Err(StoreError::schema_validation(
            "At least one column must be requested",
        ));
    }
    for column in columns {
        validate_column(table, column)?;
    }

    let mut param_idx = 1;
    let (conjunction, params) = build_filter_conjunction(table, filters, None, &mut param_idx)?;

    let select_list: Vec<String> = columns
        .iter()
        .map(|c| format!("{}::text", quote_identifier(c)))
        .collect();

    Ok(Statement {
        sql: format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT {} FROM {} WHERE {}) AS d",
            select_list.join(", "),
            quote_identifier(&table.name),
            conjunction
        ),
        params,
    })
}

/// Build an INSERT for the given property columns, echoing the exportable
/// fields of the created row
///
/// `columns` is the ordered list of property keys the caller will bind, each
/// validated against the table. Unknown keys fail here, before any query.
pub fn build_insert(table: &TableDescriptor, columns: &[String]) -> Result<Statement> {
    if columns.is_empty() {
        return Err(StoreError::schema_validation(
            "At least one property is required",
        ));
    }

    let mut names = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        validate_column(table, column)?;
        names.push(quote_identifier(column));
        placeholders.push(format!("${}", i + 1));
    }

    let returning: Vec<String> = table
        .exportable_fields()
        .iter()
        .map(|f| quote_identifier(&f.name))
        .collect();

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote_identifier(&table.name),
            names.join(", "),
            placeholders.join(", "),
            returning.join(", ")
        ),
        params: Vec::new(),
    })
}

/// Build an UPDATE by uid for the given property columns, echoing the
/// exportable fields of the updated row
///
/// The uid binds as `$1`; property values bind in `columns` order from `$2`.
pub fn build_update(table: &TableDescriptor, columns: &[String]) -> Result<Statement> {
    if columns.is_empty() {
        return Err(StoreError::schema_validation(
            "At least one property is required",
        ));
    }
    validate_column(table, UID_COLUMN)?;

    let mut set_clauses = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        validate_column(table, column)?;
        set_clauses.push(format!("{} = ${}", quote_identifier(column), i + 2));
    }

    let returning: Vec<String> = table
        .exportable_fields()
        .iter()
        .map(|f| quote_identifier(&f.name))
        .collect();

    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = $1 RETURNING {}",
            quote_identifier(&table.name),
            set_clauses.join(", "),
            quote_identifier(UID_COLUMN),
            returning.join(", ")
        ),
        params: Vec::new(),
    })
}

/// Build a DELETE constrained by criteria
///
/// An empty criteria map is refused; deletes must always be constrained.
pub fn build_delete_where(table: &TableDescriptor, criteria: &Criteria) -> Result<Statement> {
    if criteria.is_empty() {
        return Err(StoreError::schema_validation(
            "Delete criteria cannot be empty",
        ));
    }

    let mut param_idx = 1;
    let (where_clause, params) = build_criteria_clause(table, criteria, &mut param_idx)?;

    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(&table.name),
            where_clause
        ),
        params,
    })
}

/// Build a DELETE by uid
pub fn build_delete(table: &TableDescriptor) -> Result<Statement> {
    validate_column(table, UID_COLUMN)?;

    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = $1",
            quote_identifier(&table.name),
            quote_identifier(UID_COLUMN)
        ),
        params: Vec::new(),
    })
}

//! SQL Identifier Sanitization Utilities
//!
//! Provides functions to safely validate and quote SQL identifiers before they
//! are interpolated into statement text.

use regex::Regex;

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Arguments
/// * `identifier` - The identifier to quote
///
/// # Returns
/// The identifier wrapped in double quotes with escaped internal quotes
///
/// # Example
/// ```
/// use facet_store::sql::quote_identifier;
///
/// let quoted = quote_identifier("drug_routes");
/// assert_eq!(quoted, "\"drug_routes\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    // Escape any double quotes in the identifier by doubling them
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a table or column name
///
/// True iff the name matches `^[A-Za-z0-9_]+$`. This allow-list is the sole
/// injection defense for caller-supplied identifiers; every component must
/// call it before interpolating a name into SQL text.
///
/// # Example
/// ```
/// use facet_store::sql::is_valid_identifier;
///
/// assert!(is_valid_identifier("drugs"));
/// assert!(is_valid_identifier("GenericName"));
/// assert!(!is_valid_identifier("drugs; DROP TABLE drugs"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    re.is_match(name)
}

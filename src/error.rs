//! Error types for facet-store operations

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown table, unknown column, invalid identifier shape, or invalid
    /// sort direction. Always caller-fixable; never retried.
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    /// Aggregate type name not present in the aggregate mapping registry.
    #[error("Unknown aggregate type: {0}")]
    UnknownAggregateType(String),

    /// Lookup by key/uid found no row.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store rejected a statement with a unique-constraint violation.
    /// Kept separate from `Query` so callers can distinguish the two.
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// The underlying store rejected or failed a syntactically valid
    /// statement. Not retried automatically.
    #[error("Query execution error: {0}")]
    Query(String),

    /// A cascading delete failed partway through. `completed` lists the
    /// steps that already ran and were not undone.
    #[error("cascade delete failed at step '{failed_step}' after {} completed step(s): {source}", completed.len())]
    PartialCascade {
        completed: Vec<String>,
        failed_step: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the HTTP-layer collaborator to pick a
/// status code without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-fixable request problem (400-equivalent)
    BadRequest,
    /// Missing row or unknown aggregate type (404-equivalent)
    NotFound,
    /// Unique-constraint conflict (409-equivalent)
    Conflict,
    /// Execution or connectivity failure (500-equivalent)
    Internal,
}

impl StoreError {
    pub fn schema_validation(msg: impl Into<String>) -> Self {
        Self::SchemaValidation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unknown_aggregate_type(msg: impl Into<String>) -> Self {
        Self::UnknownAggregateType(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaValidation(_) | Self::Json(_) => ErrorKind::BadRequest,
            Self::NotFound(_) | Self::UnknownAggregateType(_) => ErrorKind::NotFound,
            Self::UniqueViolation(_) => ErrorKind::Conflict,
            Self::Query(_) | Self::PartialCascade { .. } | Self::Connection(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // SQLSTATE 23505: unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return Self::UniqueViolation(db_err.message().to_string());
            }
        }
        Self::Query(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            StoreError::schema_validation("bad column").kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(StoreError::not_found("row").kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::unknown_aggregate_type("GenericRoute").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::UniqueViolation("dup".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(StoreError::query("boom").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_partial_cascade_display() {
        let err = StoreError::PartialCascade {
            completed: vec!["drug_routes".to_string(), "drug_approvals".to_string()],
            failed_step: "entity_relationships".to_string(),
            source: Box::new(StoreError::query("connection reset")),
        };

        let msg = err.to_string();
        assert!(msg.contains("entity_relationships"));
        assert!(msg.contains("2 completed"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

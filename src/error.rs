use thiserror::Error;

/// Error types for table operations
#[derive(Error, Debug)]
pub enum TableError {
    #[error("row is missing its key")]
    MissingKey,

    #[error("table '{0}' must declare a required inline string field named 'key'")]
    BadKeySchema(String),

    #[error("field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("required field '{0}' is missing")]
    MissingField(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl TableError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TableError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

//! Error types for Stripemeter core.

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building or validating usage events locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Timestamp is not a valid ISO-8601 date-time.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A batch must contain at least one event.
    #[error("batch contains no events")]
    EmptyBatch,
}

impl CoreError {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

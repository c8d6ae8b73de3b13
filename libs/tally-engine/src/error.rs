use tally_api::StorageError;

/// Why an inbound event was rejected. Rejected events are dropped, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("quantity {value:?} is not a non-negative integer")]
    InvalidQuantity { value: String },

    #[error("product id {value:?} is not numeric")]
    InvalidProductId { value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("scan task failed: {0}")]
    ScanTask(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Storage` variant, context is added to the inner `StorageError`.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Storage(e) => EngineError::Storage(e.with_context(ctx)),
            other => other,
        }
    }
}

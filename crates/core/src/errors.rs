use thiserror::Error;

/// Failure reported by a persistence backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("assessment `{id}` is in an invalid state: {reason}")]
    InvalidState { id: String, reason: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn invalid_state(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState { id: id.into(), reason: reason.into() }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
        }
    }

    /// Process exit code used by the operator CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Storage(_) => 5,
            Self::NotFound { .. } => 6,
            Self::InvalidState { .. } => 7,
        }
    }
}

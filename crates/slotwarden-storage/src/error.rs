use thiserror::Error;

/// Storage-specific error types for slot persistence.
///
/// These errors represent failures in database operations, snapshot
/// parsing, and integrity checks on persisted or imported slot records.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Snapshot JSON could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// A persisted row could not be turned back into a slot
    #[error("Corrupt record for slot {slot}: {message}")]
    Corrupt { slot: i64, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn corrupt(slot: i64, message: impl Into<String>) -> Self {
        Self::Corrupt {
            slot,
            message: message.into(),
        }
    }
}

impl From<slotwarden_core::Error> for StorageError {
    fn from(error: slotwarden_core::Error) -> Self {
        match error {
            slotwarden_core::Error::Validation(message) => Self::Validation(message),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Malformed imports are the caller's fault; everything else is a
/// persistence failure.
impl From<StorageError> for slotwarden_core::Error {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Validation(message) => slotwarden_core::Error::Validation(message),
            StorageError::Serialization(e) => {
                slotwarden_core::Error::validation(format!("Malformed snapshot: {e}"))
            }
            other => slotwarden_core::Error::Persistence(other.to_string()),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_core_validation() {
        let core: slotwarden_core::Error = StorageError::Validation("bad id".into()).into();
        assert_eq!(core, slotwarden_core::Error::Validation("bad id".to_string()));
    }

    #[test]
    fn test_database_failure_maps_to_persistence() {
        let core: slotwarden_core::Error = StorageError::Internal("disk full".into()).into();
        assert!(matches!(core, slotwarden_core::Error::Persistence(_)));
    }

    #[test]
    fn test_core_validation_is_not_double_prefixed() {
        let storage: StorageError = slotwarden_core::Error::validation("PIN too short").into();
        assert_eq!(storage.to_string(), "Validation error: PIN too short");
    }
}

//! Error types for instinct operations.
//!
//! All failures surface as structured variants so callers can branch on kind:
//! validation problems, missing records, unrecognized status values, and the
//! migration-specific integrity/backup failures each get their own variant.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for instinct operations.
pub type InstinctResult<T> = Result<T, InstinctError>;

/// Main error type for all instinct operations.
#[derive(Error, Debug)]
pub enum InstinctError {
    /// Input validation failed on create or update.
    #[error("Validation error: {message}")]
    Validation { message: String, code: ErrorCode },

    /// Instinct record not found.
    #[error("Instinct not found: {id}")]
    NotFound { id: Uuid },

    /// Status value outside the recognized set.
    #[error("Unknown status value: '{value}'")]
    UnknownStatus { value: String },

    /// Post-migration verification found a mismatch or missing record.
    #[error("Migration integrity error for thread '{thread_id}': {message}")]
    MigrationIntegrity { thread_id: String, message: String },

    /// Backup of a legacy file could not be written; migration must not
    /// proceed without a recoverable original.
    #[error("Backup write failed for {path}: {source}")]
    BackupWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Parse error (timestamps, stored enums).
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValOutOfRange,

    // Instinct records (INST_xxx)
    InstNotFound,
    InstUnknownStatus,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Migration (MIG_xxx)
    MigVerifyMismatch,
    MigBackupFailed,

    // Parse (PARSE_xxx)
    ParseInvalidValue,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValOutOfRange => "VAL_003",
            ErrorCode::InstNotFound => "INST_001",
            ErrorCode::InstUnknownStatus => "INST_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::MigVerifyMismatch => "MIG_001",
            ErrorCode::MigBackupFailed => "MIG_002",
            ErrorCode::ParseInvalidValue => "PARSE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl InstinctError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
        }
    }

    /// Create a validation error for an empty required field.
    pub fn missing_field(field: &str) -> Self {
        Self::Validation {
            message: format!("Field '{}' must be non-empty", field),
            code: ErrorCode::ValMissingField,
        }
    }

    /// Create a validation error for an out-of-range value.
    pub fn out_of_range(field: &str, value: f64) -> Self {
        Self::Validation {
            message: format!("Field '{}' out of range [0.0, 1.0]: {}", field, value),
            code: ErrorCode::ValOutOfRange,
        }
    }

    /// Create a not found error.
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound { id }
    }

    /// Create an unknown status error.
    pub fn unknown_status(value: impl Into<String>) -> Self {
        Self::UnknownStatus {
            value: value.into(),
        }
    }

    /// Create a migration integrity error.
    pub fn migration_integrity(thread_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MigrationIntegrity {
            thread_id: thread_id.into(),
            message: message.into(),
        }
    }

    /// Create a backup write error.
    pub fn backup_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::BackupWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::NotFound { .. } => ErrorCode::InstNotFound,
            Self::UnknownStatus { .. } => ErrorCode::InstUnknownStatus,
            Self::MigrationIntegrity { .. } => ErrorCode::MigVerifyMismatch,
            Self::BackupWrite { .. } => ErrorCode::MigBackupFailed,
            Self::Database { code, .. } => *code,
            Self::Parse { .. } => ErrorCode::ParseInvalidValue,
            _ => ErrorCode::Internal,
        }
    }
}

impl From<rusqlite::Error> for InstinctError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = InstinctError::validation("bad input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_missing_field_error() {
        let err = InstinctError::missing_field("trigger");
        assert_eq!(err.code(), ErrorCode::ValMissingField);
        assert!(err.to_string().contains("trigger"));
    }

    #[test]
    fn test_not_found_error() {
        let id = Uuid::new_v4();
        let err = InstinctError::not_found(id);
        assert_eq!(err.code(), ErrorCode::InstNotFound);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_unknown_status_error() {
        let err = InstinctError::unknown_status("paused");
        assert_eq!(err.code(), ErrorCode::InstUnknownStatus);
        assert!(err.to_string().contains("paused"));
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ValOutOfRange.as_str(), "VAL_003");
        assert_eq!(ErrorCode::MigVerifyMismatch.as_str(), "MIG_001");
    }
}

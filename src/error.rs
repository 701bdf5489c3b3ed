//! Centralized error handling for the AutoComply service core.
//!
//! Provides the `AppError` enum with one variant per error kind the REST
//! frontend surfaces, implementing standard error traits and Serde
//! serialization for the wire.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Application-wide error type for consistent error handling across all modules.
///
/// Each variant represents a distinct error kind, enabling proper error
/// classification and user-friendly messaging in the frontend.
///
/// # Serialization
///
/// Serializes to JSON with structure:
/// ```json
/// { "error_type": "variant_name", "message": "details" }
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    /// Referenced entity missing (case, submission, evidence, attachment)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input, invalid enum value, evidence id not owned by case
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Illegal status transition, cancelled-case write, duplicate unique key
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Download of a soft-deleted attachment
    #[error("Gone: {0}")]
    Gone(String),

    /// Download of a redacted attachment
    #[error("Unavailable for legal reasons: {0}")]
    UnavailableForLegalReasons(String),

    /// Database operation failures (SQLite, connection issues, query errors)
    #[error("Database error: {0}")]
    Database(String),

    /// Blob file storage operations (read, write, delete, path resolution)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Store I/O faults, missing signing key in production, serialization bugs
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error kind name for serialization
    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Conflict(_) => "Conflict",
            AppError::Gone(_) => "Gone",
            AppError::UnavailableForLegalReasons(_) => "UnavailableForLegalReasons",
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::Internal(_) => "Internal",
        }
    }

    /// Returns the error message content
    fn message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Gone(msg)
            | AppError::UnavailableForLegalReasons(msg)
            | AppError::Database(msg)
            | AppError::Storage(msg)
            | AppError::Internal(msg) => msg.clone(),
        }
    }

    /// Conflict raised by any write against a read-only (cancelled) case.
    pub fn case_read_only() -> Self {
        AppError::Conflict("case is read-only".to_string())
    }
}

/// Custom serialization for wire compatibility.
///
/// Produces JSON in the format:
/// ```json
/// { "error_type": "Conflict", "message": "case is read-only" }
/// ```
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("error_type", self.error_type())?;
        state.serialize_field("message", &self.message())?;
        state.end()
    }
}

// ============================================================================
// From implementations for automatic error conversion
// ============================================================================

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                if msg.contains("UNIQUE constraint failed")
                    || msg.contains("FOREIGN KEY constraint failed")
                    || msg.contains("CHECK constraint failed")
                {
                    AppError::Conflict(format!("Constraint violation: {}", msg))
                } else {
                    AppError::Database(format!("Database error: {}", msg))
                }
            }
            sqlx::Error::Io(io_err) => AppError::Database(format!("Database I/O error: {}", io_err)),
            sqlx::Error::Configuration(config_err) => {
                AppError::Database(format!("Database configuration error: {}", config_err))
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound(format!("File not found: {}", err)),
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                AppError::BadRequest(format!("Invalid data: {}", err))
            }
            _ => AppError::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Io => AppError::Storage(format!("JSON I/O error: {}", err)),
            serde_json::error::Category::Syntax => {
                AppError::BadRequest(format!("Invalid JSON syntax: {}", err))
            }
            serde_json::error::Category::Data => {
                AppError::BadRequest(format!("Invalid JSON data: {}", err))
            }
            serde_json::error::Category::Eof => {
                AppError::BadRequest(format!("Unexpected end of JSON: {}", err))
            }
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        AppError::Database(err.to_string())
    }
}

// ============================================================================
// Convenience type alias
// ============================================================================

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::Conflict("case is read-only".to_string());
        assert_eq!(err.to_string(), "Conflict: case is read-only");

        let err = AppError::Gone("attachment deleted".to_string());
        assert_eq!(err.to_string(), "Gone: attachment deleted");
    }

    #[test]
    fn test_error_serialization() {
        let err = AppError::NotFound("case abc".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"error_type\":\"NotFound\""));
        assert!(json.contains("\"message\":\"case abc\""));

        let err = AppError::UnavailableForLegalReasons("attachment redacted".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"error_type\":\"UnavailableForLegalReasons\""));
    }

    #[test]
    fn test_error_type_classification() {
        assert_eq!(AppError::NotFound("x".into()).error_type(), "NotFound");
        assert_eq!(AppError::BadRequest("x".into()).error_type(), "BadRequest");
        assert_eq!(AppError::Conflict("x".into()).error_type(), "Conflict");
        assert_eq!(AppError::Gone("x".into()).error_type(), "Gone");
        assert_eq!(
            AppError::UnavailableForLegalReasons("x".into()).error_type(),
            "UnavailableForLegalReasons"
        );
        assert_eq!(AppError::Database("x".into()).error_type(), "Database");
        assert_eq!(AppError::Storage("x".into()).error_type(), "Storage");
        assert_eq!(AppError::Internal("x".into()).error_type(), "Internal");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::NotFound(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad bytes");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_case_read_only_helper() {
        let err = AppError::case_read_only();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.to_string().contains("case is read-only"));
    }
}

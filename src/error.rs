//! Error Types and Handling
//!
//! Error types for the provdb provenance engine with structured error codes
//! for programmatic handling and detailed messages for debugging.
//!
//! # Error Categories
//!
//! Errors are organized into categories with numeric codes:
//!
//! | Range | Category | Examples |
//! |-------|----------|----------|
//! | 1xxx | Validation | Validation |
//! | 2xxx | Not found | NotFound |
//! | 3xxx | Referential | ReferentialIntegrity |
//! | 4xxx | Conflict | Conflict |
//! | 5xxx | Sync | SyncFailure |
//! | 6xxx | Traversal | DepthCeilingExceeded |
//! | 7xxx | I/O | Io |
//! | 8xxx | Storage | Serialization, InvalidDatabase, Corruption |
//!
//! # Example
//!
//! ```rust
//! use provdb::error::{ProvError, Result, ErrorCode};
//!
//! fn lookup() -> Result<()> {
//!     Err(ProvError::NotFound("entity 'e1' not found".to_string()))
//! }
//!
//! let err = lookup().unwrap_err();
//! assert_eq!(err.error_code(), ErrorCode::NotFound);
//! assert_eq!(err.error_code().category(), "NotFound");
//! ```

use thiserror::Error;

/// Error code categories for programmatic error handling.
///
/// Each code belongs to a category indicated by its numeric range. Use
/// [`ErrorCode::category()`] for the human-readable category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Input failed validation before any store access
    Validation = 1001,

    /// Referenced record or procedure does not exist
    NotFound = 2001,

    /// Relation insert references a non-existent endpoint
    ReferentialIntegrity = 3001,

    /// Duplicate primary key on a strict insert
    Conflict = 4001,

    /// Graph mirror update failed; the enclosing transaction was aborted
    SyncFailure = 5001,

    /// Requested depth exceeds the configured ceiling
    DepthCeilingExceeded = 6001,

    /// Failed to read from or write to disk
    Io = 7001,

    /// Failed to serialize or deserialize data
    Serialization = 8001,
    /// Database file is invalid or unrecognized
    InvalidDatabase = 8002,
    /// Database file is corrupted
    Corruption = 8003,
}

impl ErrorCode {
    /// Get the numeric error code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a brief description of the error category
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "Validation",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::ReferentialIntegrity => "Referential",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::SyncFailure => "Sync",
            ErrorCode::DepthCeilingExceeded => "Traversal",
            ErrorCode::Io => "I/O",
            ErrorCode::Serialization | ErrorCode::InvalidDatabase | ErrorCode::Corruption => {
                "Storage"
            }
        }
    }
}

/// Error types for provdb operations
#[must_use]
#[derive(Error, Debug)]
pub enum ProvError {
    /// Failed to read from or write to disk
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize data
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input failed validation before any store access
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced record or procedure does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Relation insert references a non-existent endpoint
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    /// Duplicate primary key on a strict insert
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Graph mirror update failed; the enclosing transaction was aborted
    #[error("Graph mirror sync failed: {0}")]
    SyncFailure(String),

    /// Requested traversal depth exceeds the configured ceiling
    #[error("Depth ceiling exceeded: requested {requested}, ceiling {ceiling}")]
    DepthCeilingExceeded {
        /// Depth the caller asked for
        requested: u32,
        /// Configured hard ceiling
        ceiling: u32,
    },

    /// Database file is invalid or unrecognized
    #[error("Invalid database file: {0}")]
    InvalidDatabase(String),

    /// Database file is corrupted
    #[error("Database corruption detected: {0}")]
    Corruption(String),
}

impl ProvError {
    /// Get the structured error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProvError::Io(_) => ErrorCode::Io,
            ProvError::Serialization(_) => ErrorCode::Serialization,
            ProvError::Validation(_) => ErrorCode::Validation,
            ProvError::NotFound(_) => ErrorCode::NotFound,
            ProvError::ReferentialIntegrity(_) => ErrorCode::ReferentialIntegrity,
            ProvError::Conflict(_) => ErrorCode::Conflict,
            ProvError::SyncFailure(_) => ErrorCode::SyncFailure,
            ProvError::DepthCeilingExceeded { .. } => ErrorCode::DepthCeilingExceeded,
            ProvError::InvalidDatabase(_) => ErrorCode::InvalidDatabase,
            ProvError::Corruption(_) => ErrorCode::Corruption,
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Validation, not-found, referential, and depth errors are deterministic
    /// and never retryable; I/O errors may be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvError::Io(_))
    }
}

/// Result type alias for provdb operations
pub type Result<T> = std::result::Result<T, ProvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ProvError::Validation("endedAt < startedAt".into());
        assert_eq!(err.error_code().code(), 1001);
        assert_eq!(err.error_code().category(), "Validation");

        let err = ProvError::ReferentialIntegrity("missing entity 'x'".into());
        assert_eq!(err.error_code(), ErrorCode::ReferentialIntegrity);

        let err = ProvError::DepthCeilingExceeded {
            requested: 100,
            ceiling: 50,
        };
        assert_eq!(err.error_code().category(), "Traversal");
    }

    #[test]
    fn test_display_messages() {
        let err = ProvError::NotFound("entity 'e1' not found".into());
        assert!(err.to_string().contains("e1"));

        let err = ProvError::DepthCeilingExceeded {
            requested: 99,
            ceiling: 50,
        };
        assert!(err.to_string().contains("99"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_retryable() {
        assert!(!ProvError::Conflict("dup".into()).is_retryable());
        let io = ProvError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_retryable());
    }
}

// src/error.rs

//! Unified error handling for the ingestion engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Connection-level failure that survived every retry attempt
    #[error("Transport error after {attempts} attempt(s) calling {method}: {source}")]
    Transport {
        method: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-2xx status
    #[error("Upstream returned HTTP {status} for {method}")]
    Status { method: String, status: u16 },

    /// Response carried no element tagged with the expected method
    #[error("Response contained no result for method {method}")]
    EnvelopeMiss { method: String },

    /// Upstream reported an exception for the call
    #[error("RPC exception from {method}: {message}")]
    RpcException { method: String, message: String },

    /// A single upstream record could not be decoded
    #[error("Invalid {field} on {record} record: {value:?}")]
    FieldParse {
        record: &'static str,
        field: &'static str,
        value: String,
    },

    /// A natural key already exists in the store
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// The run was cancelled
    #[error("Ingestion cancelled")]
    Cancelled,

    /// HTTP client could not be built or a request could not be prepared
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a field parse error for one upstream record.
    pub fn field(record: &'static str, field: &'static str, value: impl fmt::Display) -> Self {
        Self::FieldParse {
            record,
            field,
            value: value.to_string(),
        }
    }

    /// Create a unique-constraint conflict error.
    pub fn conflict(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::Conflict {
            entity,
            key: key.to_string(),
        }
    }

    /// Errors that only invalidate the record being processed.
    ///
    /// Everything else aborts the batch; a rerun picks up where it stopped.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::FieldParse { .. } | Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_level_classification() {
        assert!(AppError::field("raid", "startTime", "abc").is_record_level());
        assert!(AppError::conflict("player", "G1").is_record_level());
        assert!(!AppError::Cancelled.is_record_level());
        assert!(
            !AppError::Status {
                method: "getLadder".into(),
                status: 500
            }
            .is_record_level()
        );
    }

    #[test]
    fn test_field_error_message() {
        let err = AppError::field("encounter", "endTime", "17x");
        assert_eq!(
            err.to_string(),
            "Invalid endTime on encounter record: \"17x\""
        );
    }
}

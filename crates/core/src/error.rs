//! Unified error types for shelter.
//!
//! Display strings carry a stable code prefix so hosts can branch on the
//! failure class without matching on the enum.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offline caching worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown HTTP method).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The fetch was rejected before a response arrived.
    #[error("NETWORK_FAILURE: {0}")]
    Network(String),

    /// Response body exceeded the configured cap.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// No entry stored for the request identity.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Writing an entry failed for a reason other than quota.
    #[error("CACHE_WRITE_FAILED: {0}")]
    CacheWrite(String),

    /// Storage quota would be exceeded by the write.
    #[error("CACHE_QUOTA_EXCEEDED: {0}")]
    QuotaExceeded(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Lifecycle event arrived in a state that cannot accept it.
    #[error("INVALID_TRANSITION: {0}")]
    InvalidTransition(String),

    /// Pre-caching the static manifest failed.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),
}

impl Error {
    /// True for failures where no response reached us.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// True for the storage write failure family.
    pub fn is_cache_write(&self) -> bool {
        matches!(
            self,
            Error::CacheWrite(_) | Error::QuotaExceeded(_) | Error::Database(_) | Error::MigrationFailed(_)
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Network(msg) => (-32003, msg.clone()),
            Error::FetchTooLarge(msg) => (-32004, msg.clone()),
            Error::InvalidTransition(msg) => (-32005, msg.clone()),
            Error::InstallFailed(msg) => (-32006, msg.clone()),
            Error::CacheWrite(msg) | Error::QuotaExceeded(msg) => (-32002, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("GET https://example.com/".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::Network("connection refused".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32003);
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::Network("down".into()).is_network());
        assert!(!Error::Network("down".into()).is_cache_write());
        assert!(Error::QuotaExceeded("full".into()).is_cache_write());
        assert!(Error::CacheWrite("io".into()).is_cache_write());
    }
}

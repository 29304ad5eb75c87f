//! Unified error types for the offcast gateway.

use tokio_rusqlite::rusqlite;

/// Unified error types for the offcast gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an unparseable control message).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Network-level fetch failure (DNS, connect, reset, abort).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch exceeded the configured timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response body exceeded the configured byte cap.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Pre-caching the critical resource set failed; no entries were committed.
    #[error("PRECACHE_FAILED: {0}")]
    PrecacheFailed(String),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PrecacheFailed("/index.html returned 404".to_string());
        assert!(err.to_string().contains("PRECACHE_FAILED"));
        assert!(err.to_string().contains("/index.html"));
    }

    #[test]
    fn test_network_error_display() {
        let err = Error::Network("connection refused".to_string());
        assert!(err.to_string().starts_with("NETWORK_ERROR"));
    }
}

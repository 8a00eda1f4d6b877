//! Unified error types for offgrid.
//!
//! Each variant carries a stable code prefix in its display output so that
//! log lines and MCP error payloads can be matched without parsing prose.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offgrid cache layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unresolvable URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// URL scheme cannot be fetched over the network.
    #[error("UNSUPPORTED_SCHEME: {0}")]
    UnsupportedScheme(String),

    /// Writing an entry to the store failed (quota, serialization).
    #[error("STORE_WRITE_ERROR: {0}")]
    StoreWrite(String),

    /// Reading an entry from the store failed.
    #[error("STORE_READ_ERROR: {0}")]
    StoreRead(String),

    /// A stored entry could not be decoded back into a response.
    #[error("STORE_READ_ERROR: corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Deleting a stale generation failed.
    #[error("GENERATION_DELETE_ERROR: {generation}: {reason}")]
    GenerationDelete { generation: String, reason: String },

    /// Network unreachable or the request failed in transport.
    #[error("NETWORK_FETCH_ERROR: {0}")]
    NetworkFetch(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A precache manifest URL could not be fetched during install.
    #[error("PRECACHE_FETCH_ERROR: {url}: {reason}")]
    PrecacheFetch { url: String, reason: String },

    /// Lifecycle event not valid in the current state.
    #[error("INVALID_TRANSITION: {event} while {state}")]
    InvalidTransition { state: String, event: String },

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether the network could not be reached.
    ///
    /// Only these errors allow an offline fallback. An oversized body means
    /// the network answered and is surfaced as is.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::NetworkFetch(_) | Error::FetchTimeout(_))
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

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::StoreWrite(format!("serialization failed: {err}"))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::UnsupportedScheme(_) => -32003,
            Error::NetworkFetch(_) => -32008,
            Error::FetchTimeout(_) => -32006,
            Error::FetchTooLarge(_) => -32007,
            Error::PrecacheFetch { .. } => -32013,
            Error::InvalidTransition { .. } => -32014,
            Error::GenerationDelete { .. } => -32015,
            Error::StoreWrite(_)
            | Error::StoreRead(_)
            | Error::Corrupt { .. }
            | Error::Database(_)
            | Error::MigrationFailed(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

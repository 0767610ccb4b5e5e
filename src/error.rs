//! Terminal failures surfaced by the fetch engine
//!
//! Throttling and mid-fetch token expiry are recovered inside the engine and
//! never appear here. Everything in [`FetchError`] means the current query was
//! abandoned and no partial result was returned.

use thiserror::Error;

/// Errors that abort a fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The token provider could not issue or refresh a token
    #[error("access token unavailable: {0}")]
    TokenUnavailable(String),

    /// 403, or a 401 before any page of the query succeeded
    #[error("permission denied (HTTP {status}) for {url}")]
    PermissionDenied { status: u16, url: String },

    /// 400: the filter or URL was rejected by the service
    #[error("invalid query (HTTP 400) for {url}: {message}")]
    InvalidQuery { url: String, message: String },

    /// Unclassified failures exhausted the retry budget
    #[error("request failed after {attempts} attempts for {url}: {last_error}")]
    RequestFailed {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchError {
    /// True for failures that will not go away by re-running the same query
    pub fn is_fatal_for_report(&self) -> bool {
        matches!(
            self,
            FetchError::PermissionDenied { .. } | FetchError::InvalidQuery { .. }
        )
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

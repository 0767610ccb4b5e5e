//! Retry policy for paginated directory queries
//!
//! Every failed request is classified into one of a small set of actions:
//!
//! - throttling (429/503/504) waits a fixed delay and retries forever
//! - a 401 after the query already made progress triggers one token refresh
//! - 403, or a 401 before any progress, aborts with `PermissionDenied`
//! - 400 aborts with `InvalidQuery`
//! - everything else retries immediately until the bounded budget runs out
//!
//! Throttling and refreshes never consume the bounded budget. The budget is
//! shared by all pages of one query and is not reset after a success.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::FetchError;
use crate::http::Outcome;

/// Configuration for the request retry policy
///
/// # Examples
///
/// ```
/// use entrascope::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let default_policy = RetryPolicy::default();
/// assert_eq!(default_policy.max_retries, 5);
///
/// let fast = RetryPolicy {
///     max_retries: 2,
///     throttle_delay: Duration::from_millis(10),
/// };
/// assert!(fast.throttle_delay < default_policy.throttle_delay);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Unclassified failures tolerated per query before giving up
    pub max_retries: u32,

    /// Fixed wait before retrying a throttled request
    pub throttle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            throttle_delay: Duration::from_secs(5),
        }
    }
}

/// Per-query retry bookkeeping
///
/// Created fresh for every result set and dropped when the fetch completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Unclassified failures seen so far in this query
    pub retry_count: u32,

    /// At least one page of this query has been delivered
    pub had_first_success: bool,

    /// A refresh was just performed for a 401 and has not been answered yet
    reauth_pending: bool,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks that a page of this query has been delivered
    pub fn mark_page_delivered(&mut self) {
        self.had_first_success = true;
    }
}

/// What to do after one request attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Hand the decoded body to the caller
    Deliver(Value),
    /// Sleep, then retry the same URL
    WaitAndRetry(Duration),
    /// Refresh the token, rebuild the header, retry the same URL
    Reauthenticate,
    /// Retry the same URL immediately
    RetryNow,
    /// Give up on the whole query
    Abort(FetchError),
}

impl RetryPolicy {
    /// Classifies one attempt against `url` and updates `state`
    pub fn decide(&self, outcome: Outcome, url: &str, state: &mut RetryState) -> Action {
        match outcome {
            Outcome::Success(body) => {
                state.reauth_pending = false;
                Action::Deliver(body)
            }
            Outcome::Throttled { status } => {
                warn!(
                    %url,
                    status,
                    delay_ms = self.throttle_delay.as_millis() as u64,
                    "throttled, waiting before retry"
                );
                Action::WaitAndRetry(self.throttle_delay)
            }
            Outcome::Unauthorized if state.had_first_success && !state.reauth_pending => {
                state.reauth_pending = true;
                warn!(%url, "token expired mid-fetch, refreshing");
                Action::Reauthenticate
            }
            Outcome::Unauthorized => {
                error!(
                    %url,
                    after_refresh = state.reauth_pending,
                    "unauthorized, aborting query"
                );
                Action::Abort(FetchError::PermissionDenied {
                    status: 401,
                    url: url.to_string(),
                })
            }
            Outcome::Forbidden => {
                error!(%url, "forbidden, aborting query");
                Action::Abort(FetchError::PermissionDenied {
                    status: 403,
                    url: url.to_string(),
                })
            }
            Outcome::BadRequest { message } => {
                error!(%url, %message, "query rejected by service");
                Action::Abort(FetchError::InvalidQuery {
                    url: url.to_string(),
                    message,
                })
            }
            Outcome::Transient { reason } => {
                state.retry_count += 1;
                if state.retry_count >= self.max_retries {
                    error!(%url, attempts = state.retry_count, %reason, "retry budget exhausted");
                    return Action::Abort(FetchError::RequestFailed {
                        url: url.to_string(),
                        attempts: state.retry_count,
                        last_error: reason,
                    });
                }
                debug!(
                    %url,
                    attempt = state.retry_count,
                    max = self.max_retries,
                    %reason,
                    "transient failure, retrying"
                );
                Action::RetryNow
            }
        }
    }
}

//! Single-request execution with retry, throttling and re-authentication
//!
//! [`RequestExecutor::execute`] turns one URL into one decoded [`Page`],
//! looping on the same URL for as long as the retry policy says the failure is
//! recoverable. It is the only place that sleeps or refreshes tokens in
//! response to a failed request.

use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::auth::AuthContext;
use crate::error::FetchResult;
use crate::http::{HttpClient, Outcome, RequestHeader};
use crate::retry::{Action, RetryPolicy, RetryState};

/// One response of a paginated collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub next_link: Option<String>,
}

#[derive(Deserialize)]
struct PageBody {
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

impl Page {
    /// Decodes a `{ "value": [...], "@odata.nextLink": "..." }` body
    pub fn from_body(body: Value) -> Result<Self, String> {
        let PageBody { value, next_link } = serde_json::from_value(body)
            .map_err(|e| format!("response is not a collection page: {}", e))?;
        Ok(Self {
            records: value,
            next_link: next_link.filter(|link| !link.trim().is_empty()),
        })
    }
}

/// Executes GETs against the directory API on behalf of one session
pub struct RequestExecutor {
    http: HttpClient,
    auth: AuthContext,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(http: HttpClient, auth: AuthContext, policy: RetryPolicy) -> Self {
        Self { http, auth, policy }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches one collection page, retrying per the policy
    ///
    /// `state` belongs to the enclosing result-set fetch; the retry budget
    /// it carries is shared with every other page of the same query.
    pub async fn execute(
        &self,
        header: &mut RequestHeader,
        url: &str,
        state: &mut RetryState,
    ) -> FetchResult<Page> {
        self.execute_with(header, url, state, Page::from_body).await
    }

    /// Fetches a single, non-paginated resource such as `/users/{id}`
    pub async fn execute_object(
        &self,
        header: &mut RequestHeader,
        url: &str,
    ) -> FetchResult<Value> {
        let mut state = RetryState::new();
        self.execute_with(header, url, &mut state, Ok).await
    }

    async fn execute_with<T, F>(
        &self,
        header: &mut RequestHeader,
        url: &str,
        state: &mut RetryState,
        decode: F,
    ) -> FetchResult<T>
    where
        F: Fn(Value) -> Result<T, String>,
    {
        loop {
            let outcome = self.http.get(header, url).await;

            match self.policy.decide(outcome, url, state) {
                Action::Deliver(body) => match decode(body) {
                    Ok(decoded) => return Ok(decoded),
                    Err(reason) => {
                        // An undecodable 2xx body is handled like any other unclassified failure
                        if let Action::Abort(err) =
                            self.policy.decide(Outcome::Transient { reason }, url, state)
                        {
                            return Err(err);
                        }
                    }
                },
                Action::WaitAndRetry(delay) => sleep(delay).await,
                Action::Reauthenticate => self.auth.refresh_interactive(header).await?,
                Action::RetryNow => {}
                Action::Abort(err) => return Err(err),
            }
        }
    }
}

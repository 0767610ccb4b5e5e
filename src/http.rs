//! HTTP transport for Graph-style REST endpoints
//!
//! This module issues exactly one GET per call and reports what happened as an
//! [`Outcome`]. It makes no retry decisions; those live in the executor, which
//! knows whether the current query has already made progress.
//!
//! - Connection pooling and TCP keepalive tuned for long paginated sessions
//! - Bearer, content-type and optional `ConsistencyLevel` headers
//! - Service error bodies parsed into readable messages

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::AccessToken;

const USER_AGENT: &str = concat!("entrascope/", env!("CARGO_PKG_VERSION"));

/// Headers sent with every request of a query
///
/// Owned by the caller and rebuilt in place whenever the token is refreshed.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestHeader {
    bearer: String,
    eventual_consistency: bool,
}

impl RequestHeader {
    pub fn new(token: &AccessToken, eventual_consistency: bool) -> Self {
        Self {
            bearer: token.access_token.clone(),
            eventual_consistency,
        }
    }

    /// Swaps in a refreshed token, keeping the consistency directive
    pub fn rebuild(&mut self, token: &AccessToken) {
        self.bearer = token.access_token.clone();
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer
    }

    pub fn eventual_consistency(&self) -> bool {
        self.eventual_consistency
    }
}

impl fmt::Debug for RequestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHeader")
            .field("bearer", &"<redacted>")
            .field("eventual_consistency", &self.eventual_consistency)
            .finish()
    }
}

/// Classified result of a single GET
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx with a JSON body
    Success(Value),
    /// 429, 503 or 504
    Throttled { status: u16 },
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 400
    BadRequest { message: String },
    /// Network failure, unexpected status, or an undecodable body
    Transient { reason: String },
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    error: ServiceError,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Pooled HTTP client for directory API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the given request timeout
    ///
    /// - 10 max idle connections per host
    /// - 90 second idle timeout, so a slow page does not drop the pool
    /// - 60 second TCP keepalive
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// The underlying reqwest client, shared with token and tenant lookups
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Issues one GET and classifies the response
    pub async fn get(&self, header: &RequestHeader, url: &str) -> Outcome {
        let mut request = self
            .client
            .get(url)
            .bearer_auth(header.bearer_token())
            .header(CONTENT_TYPE, "application/json");
        if header.eventual_consistency() {
            request = request.header("ConsistencyLevel", "eventual");
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%url, error = %e, "request did not complete");
                return Outcome::Transient {
                    reason: describe_transport_error(&e),
                };
            }
        };

        let status = response.status();
        debug!(%url, status = status.as_u16(), "received response");

        if status.is_success() {
            return match response.json::<Value>().await {
                Ok(body) => Outcome::Success(body),
                Err(e) => Outcome::Transient {
                    reason: format!("failed to decode response body: {}", e),
                },
            };
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Outcome::Throttled {
                status: status.as_u16(),
            },
            StatusCode::UNAUTHORIZED => Outcome::Unauthorized,
            StatusCode::FORBIDDEN => Outcome::Forbidden,
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Outcome::BadRequest {
                    message: service_error_message(&body),
                }
            }
            _ => Outcome::Transient {
                reason: format!("unexpected HTTP status {}", status.as_u16()),
            },
        }
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("request error: {}", err)
    }
}

/// Pulls `error.code: error.message` out of a service error body
fn service_error_message(body: &str) -> String {
    match serde_json::from_str::<ServiceErrorBody>(body) {
        Ok(ServiceErrorBody { error }) => match (error.code, error.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => "no error detail".to_string(),
        },
        Err(_) if body.trim().is_empty() => "no error detail".to_string(),
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

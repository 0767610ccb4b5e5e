//! Engine configuration with builder pattern
//!
//! Gathers endpoint URLs, transport timeout, retry policy and lookup
//! concurrency in one place. The CLI folds its flags into this; tests use the
//! builder to point the engine at a mock server with short delays.

use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL every collection path is appended to
    pub graph_url: String,
    /// Identity platform host used for tokens and tenant discovery
    pub authority_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Secondary lookups allowed in flight at once
    pub lookup_concurrency: usize,
    /// Account hint passed along with interactive refreshes
    pub login_hint: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            authority_url: DEFAULT_AUTHORITY_URL.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            lookup_concurrency: 1,
            login_hint: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Joins a collection path onto the Graph base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.graph_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn graph_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph_url = url.into();
        self
    }

    pub fn authority_url(mut self, url: impl Into<String>) -> Self {
        self.config.authority_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries.max(1);
        self
    }

    pub fn throttle_delay(mut self, delay: Duration) -> Self {
        self.config.retry.throttle_delay = delay;
        self
    }

    pub fn lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.config.lookup_concurrency = concurrency.max(1);
        self
    }

    pub fn login_hint(mut self, hint: Option<String>) -> Self {
        self.config.login_hint = hint;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

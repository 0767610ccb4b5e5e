#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use entrascope::auth::{AccessToken, AuthContext, Audience, TokenProvider, TokenRequest};
use entrascope::config::EngineConfig;
use entrascope::error::{FetchError, FetchResult};
use entrascope::executor::RequestExecutor;
use entrascope::http::HttpClient;
use entrascope::pagination::PaginationDriver;
use entrascope::retry::RetryPolicy;
use entrascope::session::GraphSession;
use entrascope::tenant::TenantId;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TENANT: &str = "72f988bf-86f1-41af-91ab-2d7cd011db47";

pub fn tenant() -> TenantId {
    TENANT.parse().expect("valid tenant id")
}

/// Issues `token-1`, `token-2`, ... and records every request it receives
#[derive(Default)]
pub struct CountingTokenProvider {
    issued: AtomicUsize,
    requests: Mutex<Vec<TokenRequest>>,
    fail: bool,
}

impl CountingTokenProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TokenRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn forced_refreshes(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.force_refresh && !r.interactive)
            .count()
    }

    pub fn interactive_refreshes(&self) -> usize {
        self.requests().iter().filter(|r| r.interactive).count()
    }
}

#[async_trait]
impl TokenProvider for CountingTokenProvider {
    async fn get_token(
        &self,
        _tenant: &TenantId,
        request: &TokenRequest,
    ) -> FetchResult<AccessToken> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if self.fail {
            return Err(FetchError::TokenUnavailable("no cached account".to_string()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            access_token: format!("token-{}", n),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            account: Some("responder@contoso.com".to_string()),
            audience: request.audience,
        })
    }
}

/// Engine settings pointed at a mock server, with millisecond delays
pub fn test_config(server_uri: &str) -> EngineConfig {
    EngineConfig::builder()
        .graph_url(format!("{}/v1.0", server_uri))
        .authority_url(server_uri)
        .timeout(Duration::from_secs(5))
        .throttle_delay(Duration::from_millis(10))
        .build()
}

pub fn executor(server_uri: &str, provider: Arc<dyn TokenProvider>) -> RequestExecutor {
    executor_with_policy(provider, test_config(server_uri).retry)
}

pub fn executor_with_policy(
    provider: Arc<dyn TokenProvider>,
    policy: RetryPolicy,
) -> RequestExecutor {
    let http = HttpClient::new(Duration::from_secs(5)).expect("http client");
    let auth = AuthContext::new(provider, tenant(), Audience::Graph);
    RequestExecutor::new(http, auth, policy)
}

pub fn driver(server_uri: &str, provider: Arc<dyn TokenProvider>) -> PaginationDriver {
    PaginationDriver::new(executor(server_uri, provider))
}

pub fn session(server_uri: &str, provider: Arc<dyn TokenProvider>) -> GraphSession {
    GraphSession::new(test_config(server_uri), provider, tenant()).expect("session")
}

/// A collection page of `count` records numbered from `start`
pub fn page(start: usize, count: usize, next_link: Option<String>) -> Value {
    let records: Vec<Value> = (start..start + count)
        .map(|i| json!({"id": format!("rec-{}", i)}))
        .collect();
    match next_link {
        Some(link) => json!({"value": records, "@odata.nextLink": link}),
        None => json!({"value": records}),
    }
}

pub fn ids(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

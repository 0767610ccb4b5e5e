//! Access token acquisition and the per-session auth context
//!
//! The engine never acquires credentials itself. It talks to a
//! [`TokenProvider`] and reacts to what the service says about the token it
//! was handed:
//!
//! - silent acquisition for the first header of a query
//! - interactive refresh when a 401 arrives after the query already made progress
//! - forced refresh between pages of long-running fetches
//!
//! Two providers ship with the crate: [`StaticTokenProvider`] for a token
//! obtained out of band, and [`ClientCredentialsProvider`] for app-only access
//! through the OAuth2 client-credentials grant.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult};
use crate::http::RequestHeader;
use crate::tenant::TenantId;

/// Default token lifetime assumed when the issuer does not report one
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// The API a token is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Audience {
    /// Microsoft Graph
    #[default]
    Graph,
    /// Azure Resource Manager
    ResourceManager,
}

impl Audience {
    /// The `.default` scope requested for this audience
    pub fn scope(&self) -> &'static str {
        match self {
            Audience::Graph => "https://graph.microsoft.com/.default",
            Audience::ResourceManager => "https://management.azure.com/.default",
        }
    }
}

/// A bearer credential issued for one audience
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub account: Option<String>,
    pub audience: Audience,
}

impl AccessToken {
    /// Whether the token is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// How a token should be obtained
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub login_hint: Option<String>,
    pub force_refresh: bool,
    pub interactive: bool,
    pub audience: Audience,
}

impl TokenRequest {
    pub fn silent(audience: Audience) -> Self {
        Self {
            audience,
            ..Self::default()
        }
    }

    pub fn forced(audience: Audience) -> Self {
        Self {
            audience,
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn interactive(audience: Audience, login_hint: Option<String>) -> Self {
        Self {
            audience,
            login_hint,
            force_refresh: true,
            interactive: true,
        }
    }
}

/// Capability to obtain and refresh bearer tokens for a tenant
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(
        &self,
        tenant: &TenantId,
        request: &TokenRequest,
    ) -> FetchResult<AccessToken>;
}

/// Explicit token context for one session
///
/// Carries everything the engine needs to turn a token into a request header
/// and to refresh it. The header itself stays owned by the caller.
#[derive(Clone)]
pub struct AuthContext {
    provider: Arc<dyn TokenProvider>,
    tenant: TenantId,
    audience: Audience,
    login_hint: Option<String>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn TokenProvider>, tenant: TenantId, audience: Audience) -> Self {
        Self {
            provider,
            tenant,
            audience,
            login_hint: None,
        }
    }

    pub fn with_login_hint(mut self, login_hint: Option<String>) -> Self {
        self.login_hint = login_hint;
        self
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Silently acquires a token and builds a fresh header
    pub async fn header(&self, eventual_consistency: bool) -> FetchResult<RequestHeader> {
        let token = self
            .provider
            .get_token(&self.tenant, &TokenRequest::silent(self.audience))
            .await?;
        Ok(RequestHeader::new(&token, eventual_consistency))
    }

    /// Interactive refresh after the service rejected a token mid-fetch
    pub async fn refresh_interactive(&self, header: &mut RequestHeader) -> FetchResult<()> {
        warn!(
            tenant = %self.tenant,
            "access token rejected mid-fetch, requesting interactive refresh"
        );
        let request = TokenRequest::interactive(self.audience, self.login_hint.clone());
        let token = self.provider.get_token(&self.tenant, &request).await?;
        header.rebuild(&token);
        Ok(())
    }

    /// Forced refresh between pages
    pub async fn force_refresh(&self, header: &mut RequestHeader) -> FetchResult<()> {
        debug!(tenant = %self.tenant, "refreshing access token between pages");
        let token = self
            .provider
            .get_token(&self.tenant, &TokenRequest::forced(self.audience))
            .await?;
        header.rebuild(&token);
        Ok(())
    }
}

/// Serves a token that was acquired outside this process
///
/// Refreshes return the same token. If the service keeps rejecting it, the
/// engine escalates to `PermissionDenied` after one refresh attempt.
pub struct StaticTokenProvider {
    token: String,
    expires_at: DateTime<Utc>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + ChronoDuration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(
        &self,
        _tenant: &TenantId,
        request: &TokenRequest,
    ) -> FetchResult<AccessToken> {
        if self.token.trim().is_empty() {
            return Err(FetchError::TokenUnavailable("empty access token".to_string()));
        }
        if request.force_refresh {
            debug!("static token provider cannot refresh, reusing the supplied token");
        }
        Ok(AccessToken {
            access_token: self.token.clone(),
            expires_at: self.expires_at,
            account: None,
            audience: request.audience,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// App-only tokens via the OAuth2 client-credentials grant
///
/// Tokens are cached per audience and reused until they expire. A forced or
/// interactive request always goes back to the token endpoint; there is no
/// user to prompt in this flow, so both mean "issue a new token".
pub struct ClientCredentialsProvider {
    client: Client,
    authority: String,
    client_id: String,
    client_secret: String,
    cache: ArcSwap<HashMap<Audience, AccessToken>>,
}

impl ClientCredentialsProvider {
    pub fn new(
        client: Client,
        authority: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            authority: authority.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    fn cached(&self, audience: Audience) -> Option<AccessToken> {
        let cache = self.cache.load();
        cache
            .get(&audience)
            .filter(|token| !token.is_expired_at(Utc::now()))
            .cloned()
    }

    fn store(&self, token: AccessToken) {
        self.cache.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(token.audience, token.clone());
            next
        });
    }

    async fn request_token(
        &self,
        tenant: &TenantId,
        audience: Audience,
    ) -> FetchResult<AccessToken> {
        let token_url = format!("{}/{}/oauth2/v2.0/token", self.authority, tenant);
        debug!(%token_url, scope = audience.scope(), "requesting client-credentials token");

        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", audience.scope()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::TokenUnavailable(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            return Err(FetchError::TokenUnavailable(reason));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::TokenUnavailable(format!("malformed token response: {}", e)))?;

        let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        info!(tenant = %tenant, expires_in = lifetime, "acquired access token");

        Ok(AccessToken {
            access_token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
            account: Some(self.client_id.clone()),
            audience,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn get_token(
        &self,
        tenant: &TenantId,
        request: &TokenRequest,
    ) -> FetchResult<AccessToken> {
        if !request.force_refresh {
            if let Some(token) = self.cached(request.audience) {
                return Ok(token);
            }
        }

        let token = self.request_token(tenant, request.audience).await?;
        self.store(token.clone());
        Ok(token)
    }
}

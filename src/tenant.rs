//! Tenant identity and discovery
//!
//! Every query is scoped to one tenant GUID. Operators often only know a
//! verified domain of the tenant under investigation, so a domain can be
//! resolved to the GUID through the public OpenID discovery document. That
//! endpoint is unauthenticated.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::validation::validate_domain;

/// A directory tenant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantId(Uuid);

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(TenantId)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    token_endpoint: String,
}

/// Resolves tenant domains to tenant GUIDs
pub struct TenantResolver {
    client: Client,
    authority: String,
}

impl TenantResolver {
    pub fn new(client: Client, authority: impl Into<String>) -> Self {
        Self {
            client,
            authority: authority.into().trim_end_matches('/').to_string(),
        }
    }

    /// Accepts either a tenant GUID or a verified domain of the tenant
    pub async fn resolve(&self, tenant: &str) -> Result<TenantId> {
        if let Ok(id) = tenant.parse::<TenantId>() {
            return Ok(id);
        }
        self.resolve_domain(tenant).await
    }

    /// Looks up the tenant GUID that owns `domain`
    pub async fn resolve_domain(&self, domain: &str) -> Result<TenantId> {
        let domain = domain.trim().to_ascii_lowercase();
        validate_domain(&domain).map_err(|e| anyhow!(e))?;

        let url = format!(
            "{}/{}/v2.0/.well-known/openid-configuration",
            self.authority, domain
        );
        debug!(%url, "fetching OpenID configuration");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch OpenID configuration")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "No tenant found for domain {} (HTTP {})",
                domain,
                status.as_u16()
            ));
        }

        let config: OpenIdConfiguration = response
            .json()
            .await
            .context("Failed to parse OpenID configuration")?;

        let tenant = tenant_from_token_endpoint(&config.token_endpoint)
            .ok_or_else(|| anyhow!("Unexpected token endpoint: {}", config.token_endpoint))?;

        info!(%domain, %tenant, "resolved tenant");
        Ok(tenant)
    }
}

/// Extracts the tenant GUID from `https://<authority>/<tenant>/oauth2/v2.0/token`
fn tenant_from_token_endpoint(endpoint: &str) -> Option<TenantId> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    let mut segments = url.path_segments()?;
    segments.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_from_token_endpoint() {
        let endpoint =
            "https://login.microsoftonline.com/72f988bf-86f1-41af-91ab-2d7cd011db47/oauth2/v2.0/token";
        let tenant = tenant_from_token_endpoint(endpoint).unwrap();
        assert_eq!(tenant.to_string(), "72f988bf-86f1-41af-91ab-2d7cd011db47");

        let common = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
        assert!(tenant_from_token_endpoint(common).is_none());
        assert!(tenant_from_token_endpoint("not a url").is_none());
    }

    #[test]
    fn test_tenant_id_parsing() {
        assert!("72F988BF-86F1-41AF-91AB-2D7CD011DB47".parse::<TenantId>().is_ok());
        assert!("contoso.onmicrosoft.com".parse::<TenantId>().is_err());
    }
}

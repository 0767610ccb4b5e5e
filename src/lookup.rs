//! Secondary lookups that enrich report rows with display names
//!
//! Audit events, role assignments and permission grants reference directory
//! objects by id. Resolving those ids is best effort: a lookup that fails for
//! any reason yields `None` and the row is exported with the enrichment field
//! left empty. Results (including misses) are cached for the whole session.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use futures::{stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::executor::RequestExecutor;
use crate::http::RequestHeader;
use crate::rate_limit::RateLimiter;

/// Kinds of directory objects that can be looked up by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    User,
    ServicePrincipal,
    RoleDefinition,
    /// Any directory object when the concrete type is unknown
    DirectoryObject,
}

impl ObjectKind {
    fn path(&self, id: &str) -> String {
        let id = urlencoding::encode(id);
        match self {
            ObjectKind::User => format!("users/{}?$select=displayName,userPrincipalName", id),
            ObjectKind::ServicePrincipal => {
                format!("servicePrincipals/{}?$select=displayName,appId", id)
            }
            ObjectKind::RoleDefinition => {
                format!("roleManagement/directory/roleDefinitions/{}?$select=displayName", id)
            }
            ObjectKind::DirectoryObject => format!("directoryObjects/{}", id),
        }
    }
}

/// Picks the most readable name a directory object carries
fn display_name_of(object: &Value) -> Option<String> {
    ["displayName", "userPrincipalName", "appId"]
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str))
        .find(|name| !name.trim().is_empty())
        .map(str::to_string)
}

/// Cached, rate-limited display-name resolution
pub struct DirectoryLookup {
    base_url: String,
    limiter: RateLimiter,
    concurrency: usize,
    cache: DashMap<(ObjectKind, String), Option<String>>,
}

impl DirectoryLookup {
    pub fn new(base_url: impl Into<String>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::for_directory_lookups(concurrency),
            concurrency,
            cache: DashMap::new(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Resolves one id, swallowing every failure
    pub async fn display_name(
        &self,
        executor: &RequestExecutor,
        header: &RequestHeader,
        kind: ObjectKind,
        id: &str,
    ) -> Option<String> {
        if id.trim().is_empty() {
            return None;
        }

        let key = (kind, id.to_string());
        if let Some(cached) = self.cache.get(&key).map(|entry| entry.value().clone()) {
            return cached;
        }

        let resolved = self.fetch_display_name(executor, header, kind, id).await;
        self.cache.insert(key, resolved.clone());
        resolved
    }

    async fn fetch_display_name(
        &self,
        executor: &RequestExecutor,
        header: &RequestHeader,
        kind: ObjectKind,
        id: &str,
    ) -> Option<String> {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                debug!(?kind, %id, error = %e, "lookup skipped");
                return None;
            }
        };

        let url = format!("{}/{}", self.base_url, kind.path(id));
        // Each lookup works on its own copy so concurrent refreshes never race
        let mut header = header.clone();
        match executor.execute_object(&mut header, &url).await {
            Ok(object) => display_name_of(&object),
            Err(e) => {
                debug!(?kind, %id, error = %e, "lookup failed, leaving enrichment empty");
                None
            }
        }
    }

    /// Resolves many ids, returning names in the same order as `ids`
    ///
    /// Each distinct id is requested at most once, however often it repeats.
    pub async fn display_names(
        &self,
        executor: &RequestExecutor,
        header: &RequestHeader,
        kind: ObjectKind,
        ids: &[String],
    ) -> Vec<Option<String>> {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let pending: Vec<_> = distinct
            .iter()
            .map(|id| self.display_name(executor, header, kind, id))
            .collect();
        let resolved: Vec<Option<String>> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let names: HashMap<&str, Option<String>> = distinct.into_iter().zip(resolved).collect();
        ids.iter()
            .map(|id| names.get(id.as_str()).cloned().flatten())
            .collect()
    }

    /// Number of distinct ids looked up so far
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

//! A collection session against one tenant
//!
//! [`GraphSession`] wires the HTTP client, token context, retry policy,
//! pagination driver and lookup cache together, and runs report adapters on
//! top of them. It is the library's main entry point.
//!
//! # Examples
//!
//! ```no_run
//! use entrascope::auth::StaticTokenProvider;
//! use entrascope::config::EngineConfig;
//! use entrascope::reports::DomainsReport;
//! use entrascope::session::GraphSession;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let tenant = "72f988bf-86f1-41af-91ab-2d7cd011db47".parse()?;
//! let provider = Arc::new(StaticTokenProvider::new("eyJ..."));
//! let session = GraphSession::new(EngineConfig::default(), provider, tenant)?;
//!
//! let domains = session.run(&DomainsReport).await?;
//! println!("{} domains", domains.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::auth::{Audience, AuthContext, TokenProvider};
use crate::config::EngineConfig;
use crate::error::FetchResult;
use crate::executor::RequestExecutor;
use crate::http::HttpClient;
use crate::lookup::{DirectoryLookup, ObjectKind};
use crate::pagination::{PaginationDriver, ResultSet};
use crate::query::Query;
use crate::reports::Report;
use crate::tenant::TenantId;

pub struct GraphSession {
    config: EngineConfig,
    driver: PaginationDriver,
    lookup: DirectoryLookup,
}

impl GraphSession {
    /// Creates a session with its own HTTP client
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn TokenProvider>,
        tenant: TenantId,
    ) -> Result<Self> {
        let http = HttpClient::new(config.timeout)?;
        Ok(Self::with_http(config, http, provider, tenant))
    }

    /// Creates a session that shares an existing HTTP client
    pub fn with_http(
        config: EngineConfig,
        http: HttpClient,
        provider: Arc<dyn TokenProvider>,
        tenant: TenantId,
    ) -> Self {
        let auth = AuthContext::new(provider, tenant, Audience::Graph)
            .with_login_hint(config.login_hint.clone());
        let executor = RequestExecutor::new(http, auth, config.retry.clone());
        let lookup = DirectoryLookup::new(config.graph_url.clone(), config.lookup_concurrency);

        Self {
            driver: PaginationDriver::new(executor),
            lookup,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tenant(&self) -> &TenantId {
        self.driver.executor().auth().tenant()
    }

    pub fn driver(&self) -> &PaginationDriver {
        &self.driver
    }

    /// Joins a collection path onto the configured Graph base URL
    pub fn endpoint(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    pub async fn fetch(&self, query: &Query) -> FetchResult<ResultSet> {
        self.driver.fetch_query(query).await
    }

    /// Runs several queries and concatenates their results in order
    pub async fn fetch_many(&self, queries: &[Query]) -> FetchResult<ResultSet> {
        self.driver.fetch_queries(queries).await
    }

    /// Resolves display names for `ids`, in order
    ///
    /// Never fails: if not even a header can be obtained, every name is `None`.
    pub async fn resolve_names(&self, kind: ObjectKind, ids: &[String]) -> Vec<Option<String>> {
        if ids.is_empty() {
            return Vec::new();
        }

        let executor = self.driver.executor();
        let header = match executor.auth().header(false).await {
            Ok(header) => header,
            Err(e) => {
                debug!(error = %e, "no token for lookups, skipping enrichment");
                return vec![None; ids.len()];
            }
        };

        self.lookup
            .display_names(executor, &header, kind, ids)
            .await
    }

    /// Fetches and projects one report
    pub async fn run<R: Report>(&self, report: &R) -> FetchResult<Vec<R::Row>> {
        let queries = report.queries(&self.config, Utc::now());
        info!(
            report = report.name(),
            tenant = %self.tenant(),
            queries = queries.len(),
            "running report"
        );

        let result = self.fetch_many(&queries).await?;
        let rows = report.project(self, result.into_records()).await;

        info!(report = report.name(), rows = rows.len(), "report complete");
        Ok(rows)
    }
}

//! Cursor-following fetch of complete result sets
//!
//! A query's first URL is fetched, then each `@odata.nextLink` in turn until
//! the service stops returning one. Records are accumulated in fetch order.
//! The contract is all-or-nothing: if any page ultimately fails, the records
//! gathered so far are dropped and the error is returned.
//!
//! A fresh token is forced before the third and every later page. The first
//! page's token is still new when page two is requested.

use serde_json::Value;
use tracing::{debug, info};

use crate::error::FetchResult;
use crate::executor::RequestExecutor;
use crate::http::RequestHeader;
use crate::query::Query;
use crate::retry::RetryState;

/// All records of one query, in the order they were fetched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<Value>,
    pages: usize,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of pages the records arrived in
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Value> {
        self.records
    }

    fn append(&mut self, other: ResultSet) {
        self.records.extend(other.records);
        self.pages += other.pages;
    }
}

/// Drives pagination for one session
pub struct PaginationDriver {
    executor: RequestExecutor,
}

impl PaginationDriver {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Fetches every page reachable from `initial_url`
    pub async fn fetch_all(
        &self,
        header: &mut RequestHeader,
        initial_url: &str,
    ) -> FetchResult<ResultSet> {
        let mut state = RetryState::new();
        let mut url = initial_url.to_string();
        let mut result = ResultSet::default();

        loop {
            let page = self.executor.execute(header, &url, &mut state).await?;
            result.pages += 1;
            debug!(
                page = result.pages,
                records = page.records.len(),
                has_next = page.next_link.is_some(),
                "fetched page"
            );
            result.records.extend(page.records);

            url = match page.next_link {
                Some(next) => next,
                None => break,
            };

            if state.had_first_success {
                self.executor.auth().force_refresh(header).await?;
            }
            state.mark_page_delivered();
        }

        info!(
            url = initial_url,
            records = result.len(),
            pages = result.pages,
            "result set complete"
        );
        Ok(result)
    }

    /// Fetches one query with a freshly acquired header
    pub async fn fetch_query(&self, query: &Query) -> FetchResult<ResultSet> {
        let mut header = self
            .executor
            .auth()
            .header(query.eventual_consistency())
            .await?;
        self.fetch_all(&mut header, &query.to_url()).await
    }

    /// Fetches several queries and concatenates their results in input order
    ///
    /// Results are not deduplicated; a record matched by two queries appears
    /// twice. The first failing query aborts the whole batch.
    pub async fn fetch_queries(&self, queries: &[Query]) -> FetchResult<ResultSet> {
        let mut combined = ResultSet::default();
        for query in queries {
            let result = self.fetch_query(query).await?;
            combined.append(result);
        }
        Ok(combined)
    }

    /// Fetches one query and maps every record through `project`
    pub async fn fetch_projected<T, F>(&self, query: &Query, project: F) -> FetchResult<Vec<T>>
    where
        F: FnMut(Value) -> T,
    {
        let result = self.fetch_query(query).await?;
        Ok(result.into_records().into_iter().map(project).collect())
    }
}

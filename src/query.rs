//! OData query construction
//!
//! A [`Query`] is the immutable description of one logical fetch: the
//! collection endpoint plus `$filter`, `$select`, `$orderby` and friends.
//! Report adapters build them with [`QueryBuilder`] and the pagination driver
//! turns them into the first request URL.

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::warn;

/// An OData `$filter` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter(String);

impl Filter {
    /// An expression used verbatim
    pub fn raw(expr: impl Into<String>) -> Self {
        Filter(expr.into())
    }

    /// `field eq 'value'` with the literal escaped
    pub fn eq(field: &str, value: &str) -> Self {
        Filter(format!("{} eq '{}'", field, escape_literal(value)))
    }

    /// `field eq value` for booleans and numbers
    pub fn eq_raw(field: &str, value: impl fmt::Display) -> Self {
        Filter(format!("{} eq {}", field, value))
    }

    /// `field ne value` for booleans and numbers
    pub fn ne_raw(field: &str, value: impl fmt::Display) -> Self {
        Filter(format!("{} ne {}", field, value))
    }

    /// `field ge <timestamp>`
    pub fn ge_time(field: &str, at: DateTime<Utc>) -> Self {
        Filter(format!("{} ge {}", field, odata_timestamp(at)))
    }

    /// `field le <timestamp>`
    pub fn le_time(field: &str, at: DateTime<Utc>) -> Self {
        Filter(format!("{} le {}", field, odata_timestamp(at)))
    }

    /// `collection/any(x:x/field eq 'value')`
    pub fn any_eq(collection: &str, field: &str, value: &str) -> Self {
        Filter(format!(
            "{}/any(x:x/{} eq '{}')",
            collection,
            field,
            escape_literal(value)
        ))
    }

    pub fn and(self, other: Filter) -> Self {
        Filter(format!("{} and {}", self.0, other.0))
    }

    /// Joins alternatives with `or`, parenthesized so it composes with `and`
    pub fn any_of(filters: Vec<Filter>) -> Option<Filter> {
        match filters.len() {
            0 => None,
            1 => filters.into_iter().next(),
            _ => Some(Filter(format!(
                "({})",
                filters
                    .into_iter()
                    .map(|f| f.0)
                    .collect::<Vec<_>>()
                    .join(" or ")
            ))),
        }
    }

    /// Joins every present filter with `and`
    pub fn all_of(filters: impl IntoIterator<Item = Option<Filter>>) -> Option<Filter> {
        filters
            .into_iter()
            .flatten()
            .reduce(|acc, next| acc.and(next))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Doubles single quotes, the only escape OData string literals need
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn odata_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Oldest day offset a date range accepts, roughly a century
pub const MAX_DAYS_AGO: u32 = 36_500;

/// A relative window of days, counted backwards from now
///
/// `from_days_ago` is the recent edge of the window and `to_days_ago` the
/// older edge, so `from = 0, to = 7` means "the last seven days".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from_days_ago: Option<u32>,
    pub to_days_ago: Option<u32>,
}

impl DateRange {
    pub fn new(from_days_ago: Option<u32>, to_days_ago: Option<u32>) -> Self {
        Self {
            from_days_ago,
            to_days_ago,
        }
    }

    /// Repairs an inverted or empty window instead of rejecting it
    ///
    /// When both edges are given and `from >= to`, `to` becomes `from + 1`.
    pub fn normalized(self) -> Self {
        match (self.from_days_ago, self.to_days_ago) {
            (Some(from), Some(to)) if from >= to => {
                let corrected = from.saturating_add(1);
                warn!(
                    from_days_ago = from,
                    to_days_ago = to,
                    corrected_to_days_ago = corrected,
                    "date range start is not older than its end, widening to one day"
                );
                Self {
                    from_days_ago: Some(from),
                    to_days_ago: Some(corrected),
                }
            }
            _ => self,
        }
    }

    /// Rejects offsets beyond [`MAX_DAYS_AGO`]
    pub fn validate(&self) -> Result<(), String> {
        for days in [self.from_days_ago, self.to_days_ago].into_iter().flatten() {
            if days > MAX_DAYS_AGO {
                return Err(format!(
                    "Day offset {} is out of range (at most {})",
                    days, MAX_DAYS_AGO
                ));
            }
        }
        Ok(())
    }

    /// Timestamp filter on `field` relative to `now`
    ///
    /// Offsets beyond [`MAX_DAYS_AGO`] are clamped to it.
    pub fn filter(&self, field: &str, now: DateTime<Utc>) -> Option<Filter> {
        let oldest = self
            .to_days_ago
            .map(|days| Filter::ge_time(field, days_before(now, days)));
        let newest = self
            .from_days_ago
            .map(|days| Filter::le_time(field, days_before(now, days)));
        Filter::all_of([oldest, newest])
    }
}

fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let days = Duration::days(i64::from(days.min(MAX_DAYS_AGO)));
    now.checked_sub_signed(days).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One logical collection query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    endpoint: String,
    filter: Option<Filter>,
    select: Option<Vec<String>>,
    orderby: Option<String>,
    expand: Option<String>,
    top: Option<u32>,
    count: bool,
    eventual_consistency: bool,
}

impl Query {
    pub fn builder(endpoint: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Whether requests need `ConsistencyLevel: eventual`
    pub fn eventual_consistency(&self) -> bool {
        self.eventual_consistency
    }

    /// The first request URL, with every query option percent-encoded
    pub fn to_url(&self) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(("$filter", filter.to_string()));
        }
        if let Some(select) = &self.select {
            params.push(("$select", select.join(",")));
        }
        if let Some(orderby) = &self.orderby {
            params.push(("$orderby", orderby.clone()));
        }
        if let Some(expand) = &self.expand {
            params.push(("$expand", expand.clone()));
        }
        if let Some(top) = self.top {
            params.push(("$top", top.to_string()));
        }
        if self.count {
            params.push(("$count", "true".to_string()));
        }

        if params.is_empty() {
            return self.endpoint.clone();
        }

        let query_string = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.endpoint, separator, query_string)
    }
}

/// Fluent construction of [`Query`] values
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            query: Query {
                endpoint: endpoint.into(),
                filter: None,
                select: None,
                orderby: None,
                expand: None,
                top: None,
                count: false,
                eventual_consistency: false,
            },
        }
    }

    /// Adds a filter, combined with any existing one using `and`
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn filter_opt(self, filter: Option<Filter>) -> Self {
        match filter {
            Some(filter) => self.filter(filter),
            None => self,
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.query.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn orderby(mut self, expr: impl Into<String>) -> Self {
        self.query.orderby = Some(expr.into());
        self
    }

    pub fn expand(mut self, expr: impl Into<String>) -> Self {
        self.query.expand = Some(expr.into());
        self
    }

    /// Page size hint
    pub fn top(mut self, top: u32) -> Self {
        self.query.top = Some(top);
        self
    }

    /// Requests `$count=true`, which requires eventual consistency
    pub fn count(mut self) -> Self {
        self.query.count = true;
        self.query.eventual_consistency = true;
        self
    }

    /// Sends `ConsistencyLevel: eventual` for advanced filters
    pub fn eventual_consistency(mut self) -> Self {
        self.query.eventual_consistency = true;
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_url_encoding() {
        let query = Query::builder("https://graph.microsoft.com/v1.0/auditLogs/signIns")
            .filter(Filter::eq("userId", "0a1b"))
            .select(&["id", "createdDateTime"])
            .orderby("createdDateTime desc")
            .top(500)
            .build();

        assert_eq!(
            query.to_url(),
            "https://graph.microsoft.com/v1.0/auditLogs/signIns\
             ?$filter=userId%20eq%20%270a1b%27\
             &$select=id%2CcreatedDateTime\
             &$orderby=createdDateTime%20desc\
             &$top=500"
        );
        assert!(!query.eventual_consistency());
    }

    #[test]
    fn test_query_without_options_is_endpoint() {
        let query = Query::builder("https://graph.microsoft.com/v1.0/domains").build();
        assert_eq!(query.to_url(), "https://graph.microsoft.com/v1.0/domains");
    }

    #[test]
    fn test_count_implies_eventual_consistency() {
        let query = Query::builder("https://graph.microsoft.com/v1.0/users?x=1")
            .count()
            .build();
        assert!(query.eventual_consistency());
        assert_eq!(query.to_url(), "https://graph.microsoft.com/v1.0/users?x=1&$count=true");
    }

    #[test]
    fn test_filters_combine_with_and() {
        let query = Query::builder("https://graph.example/items")
            .filter(Filter::eq_raw("isVerified", true))
            .filter(Filter::eq("id", "o'brien.com"))
            .build();
        assert_eq!(
            query.filter().unwrap().as_str(),
            "isVerified eq true and id eq 'o''brien.com'"
        );
    }

    #[test]
    fn test_any_of() {
        assert!(Filter::any_of(vec![]).is_none());
        assert_eq!(
            Filter::any_of(vec![Filter::eq("a", "1")]).unwrap().as_str(),
            "a eq '1'"
        );
        assert_eq!(
            Filter::any_of(vec![Filter::eq("a", "1"), Filter::eq("a", "2")])
                .unwrap()
                .as_str(),
            "(a eq '1' or a eq '2')"
        );
    }

    #[test]
    fn test_date_range_filter() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let range = DateRange::new(Some(1), Some(7));
        assert_eq!(
            range.filter("createdDateTime", now).unwrap().as_str(),
            "createdDateTime ge 2024-03-03T12:00:00Z and createdDateTime le 2024-03-09T12:00:00Z"
        );
        assert!(DateRange::default().filter("createdDateTime", now).is_none());
    }

    #[test]
    fn test_out_of_range_offsets_are_clamped_and_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let range = DateRange::new(Some(0), Some(4_000_000_000)).normalized();
        assert_eq!(
            range.filter("createdDateTime", now).unwrap().as_str(),
            "createdDateTime ge 1924-04-04T12:00:00Z and createdDateTime le 2024-03-10T12:00:00Z"
        );
        assert!(range.validate().is_err());
        assert!(DateRange::new(Some(0), Some(MAX_DAYS_AGO)).validate().is_ok());
    }

    #[test]
    fn test_date_range_normalization() {
        assert_eq!(
            DateRange::new(Some(5), Some(5)).normalized(),
            DateRange::new(Some(5), Some(6))
        );
        assert_eq!(
            DateRange::new(Some(9), Some(2)).normalized(),
            DateRange::new(Some(9), Some(10))
        );
        assert_eq!(
            DateRange::new(Some(0), Some(30)).normalized(),
            DateRange::new(Some(0), Some(30))
        );
        assert_eq!(
            DateRange::new(None, Some(3)).normalized(),
            DateRange::new(None, Some(3))
        );
    }
}

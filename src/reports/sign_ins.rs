use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

use super::{boolean, integer, text, Report};
use crate::config::EngineConfig;
use crate::query::{DateRange, Filter, Query};
use crate::session::GraphSession;
use crate::validation::{validate_object_id, validate_object_ids};

const FIELDS: &[&str] = &[
    "id",
    "createdDateTime",
    "userDisplayName",
    "userPrincipalName",
    "userId",
    "appDisplayName",
    "appId",
    "ipAddress",
    "clientAppUsed",
    "correlationId",
    "conditionalAccessStatus",
    "isInteractive",
    "riskLevelDuringSignIn",
    "status",
    "location",
    "deviceDetail",
];

/// Which sign-in outcomes to include
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SignInStatus {
    #[default]
    All,
    Success,
    Failure,
}

/// Interactive and non-interactive sign-in events
#[derive(Debug, Clone, Default)]
pub struct SignInsReport {
    /// One query per user; all users when empty
    pub user_ids: Vec<String>,
    pub app_id: Option<String>,
    pub range: DateRange,
    pub status: SignInStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignInRow {
    pub created_date_time: Option<String>,
    pub user_display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub user_id: Option<String>,
    pub app_display_name: Option<String>,
    pub app_id: Option<String>,
    pub ip_address: Option<String>,
    pub client_app_used: Option<String>,
    pub error_code: Option<i64>,
    pub failure_reason: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country_or_region: Option<String>,
    pub operating_system: Option<String>,
    pub browser: Option<String>,
    pub conditional_access_status: Option<String>,
    pub is_interactive: Option<bool>,
    pub risk_level_during_sign_in: Option<String>,
    pub correlation_id: Option<String>,
    pub id: Option<String>,
}

impl SignInRow {
    fn from_record(record: &Value) -> Self {
        Self {
            created_date_time: text(record, "/createdDateTime"),
            user_display_name: text(record, "/userDisplayName"),
            user_principal_name: text(record, "/userPrincipalName"),
            user_id: text(record, "/userId"),
            app_display_name: text(record, "/appDisplayName"),
            app_id: text(record, "/appId"),
            ip_address: text(record, "/ipAddress"),
            client_app_used: text(record, "/clientAppUsed"),
            error_code: integer(record, "/status/errorCode"),
            failure_reason: text(record, "/status/failureReason"),
            city: text(record, "/location/city"),
            state: text(record, "/location/state"),
            country_or_region: text(record, "/location/countryOrRegion"),
            operating_system: text(record, "/deviceDetail/operatingSystem"),
            browser: text(record, "/deviceDetail/browser"),
            conditional_access_status: text(record, "/conditionalAccessStatus"),
            is_interactive: boolean(record, "/isInteractive"),
            risk_level_during_sign_in: text(record, "/riskLevelDuringSignIn"),
            correlation_id: text(record, "/correlationId"),
            id: text(record, "/id"),
        }
    }
}

impl SignInsReport {
    fn base_filter(&self, now: DateTime<Utc>) -> Option<Filter> {
        let status = match self.status {
            SignInStatus::All => None,
            SignInStatus::Success => Some(Filter::eq_raw("status/errorCode", 0)),
            SignInStatus::Failure => Some(Filter::ne_raw("status/errorCode", 0)),
        };
        Filter::all_of([
            self.range.normalized().filter("createdDateTime", now),
            self.app_id.as_deref().map(|app| Filter::eq("appId", app)),
            status,
        ])
    }
}

#[async_trait]
impl Report for SignInsReport {
    type Row = SignInRow;

    fn name(&self) -> &'static str {
        "sign-ins"
    }

    fn validate(&self) -> Result<(), String> {
        validate_object_ids(&self.user_ids)?;
        if let Some(app_id) = &self.app_id {
            validate_object_id(app_id)?;
        }
        self.range.validate()
    }

    fn queries(&self, config: &EngineConfig, now: DateTime<Utc>) -> Vec<Query> {
        let endpoint = config.endpoint("auditLogs/signIns");
        let base = Query::builder(endpoint)
            .filter_opt(self.base_filter(now))
            .select(FIELDS)
            .orderby("createdDateTime desc")
            .top(1000);

        if self.user_ids.is_empty() {
            return vec![base.build()];
        }

        self.user_ids
            .iter()
            .map(|user| base.clone().filter(Filter::eq("userId", user)).build())
            .collect()
    }

    async fn project(&self, _session: &GraphSession, records: Vec<Value>) -> Vec<SignInRow> {
        records.iter().map(SignInRow::from_record).collect()
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{boolean, joined, text, Report};
use crate::config::EngineConfig;
use crate::query::{Filter, Query};
use crate::session::GraphSession;
use crate::validation::validate_user_principal_name;

/// Authentication method registration state per user
#[derive(Debug, Clone, Default)]
pub struct MfaReport {
    /// One query per user; every user when empty
    pub user_principal_names: Vec<String>,
    /// Restrict to users with (or without) MFA registered
    pub mfa_registered: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MfaRow {
    pub id: Option<String>,
    pub user_principal_name: Option<String>,
    pub user_display_name: Option<String>,
    pub is_admin: Option<bool>,
    pub is_mfa_registered: Option<bool>,
    pub is_mfa_capable: Option<bool>,
    pub is_passwordless_capable: Option<bool>,
    pub is_sspr_registered: Option<bool>,
    pub default_mfa_method: Option<String>,
    pub methods_registered: Option<String>,
    pub last_updated_date_time: Option<String>,
}

impl MfaRow {
    fn from_record(record: &Value) -> Self {
        Self {
            id: text(record, "/id"),
            user_principal_name: text(record, "/userPrincipalName"),
            user_display_name: text(record, "/userDisplayName"),
            is_admin: boolean(record, "/isAdmin"),
            is_mfa_registered: boolean(record, "/isMfaRegistered"),
            is_mfa_capable: boolean(record, "/isMfaCapable"),
            is_passwordless_capable: boolean(record, "/isPasswordlessCapable"),
            is_sspr_registered: boolean(record, "/isSsprRegistered"),
            default_mfa_method: text(record, "/defaultMfaMethod"),
            methods_registered: joined(record, "/methodsRegistered"),
            last_updated_date_time: text(record, "/lastUpdatedDateTime"),
        }
    }
}

#[async_trait]
impl Report for MfaReport {
    type Row = MfaRow;

    fn name(&self) -> &'static str {
        "mfa"
    }

    fn validate(&self) -> Result<(), String> {
        self.user_principal_names
            .iter()
            .try_for_each(|upn| validate_user_principal_name(upn))
    }

    fn queries(&self, config: &EngineConfig, _now: DateTime<Utc>) -> Vec<Query> {
        // The registration report only accepts filters under eventual consistency
        let base = Query::builder(
            config.endpoint("reports/authenticationMethods/userRegistrationDetails"),
        )
        .filter_opt(
            self.mfa_registered
                .map(|registered| Filter::eq_raw("isMfaRegistered", registered)),
        )
        .eventual_consistency();

        if self.user_principal_names.is_empty() {
            return vec![base.build()];
        }

        self.user_principal_names
            .iter()
            .map(|upn| {
                base.clone()
                    .filter(Filter::eq("userPrincipalName", upn))
                    .build()
            })
            .collect()
    }

    async fn project(&self, _session: &GraphSession, records: Vec<Value>) -> Vec<MfaRow> {
        records.iter().map(MfaRow::from_record).collect()
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

use super::{joined, text, Report};
use crate::config::EngineConfig;
use crate::query::{Filter, Query};
use crate::session::GraphSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyState {
    Enabled,
    Disabled,
    EnabledForReportingButNotEnforced,
}

impl PolicyState {
    /// The value Graph uses for `state`
    pub fn as_odata(&self) -> &'static str {
        match self {
            PolicyState::Enabled => "enabled",
            PolicyState::Disabled => "disabled",
            PolicyState::EnabledForReportingButNotEnforced => "enabledForReportingButNotEnforced",
        }
    }
}

/// Conditional access policies, optionally restricted to one state
#[derive(Debug, Clone, Default)]
pub struct ConditionalAccessReport {
    pub state: Option<PolicyState>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PolicyRow {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub state: Option<String>,
    pub created_date_time: Option<String>,
    pub modified_date_time: Option<String>,
    pub include_users: Option<String>,
    pub exclude_users: Option<String>,
    pub include_groups: Option<String>,
    pub exclude_groups: Option<String>,
    pub include_roles: Option<String>,
    pub exclude_roles: Option<String>,
    pub include_applications: Option<String>,
    pub client_app_types: Option<String>,
    pub grant_operator: Option<String>,
    pub built_in_controls: Option<String>,
    pub session_controls: Option<String>,
}

impl PolicyRow {
    fn from_record(record: &Value) -> Self {
        let users = |field: &str| joined(record, &format!("/conditions/users/{}", field));
        Self {
            id: text(record, "/id"),
            display_name: text(record, "/displayName"),
            state: text(record, "/state"),
            created_date_time: text(record, "/createdDateTime"),
            modified_date_time: text(record, "/modifiedDateTime"),
            include_users: users("includeUsers"),
            exclude_users: users("excludeUsers"),
            include_groups: users("includeGroups"),
            exclude_groups: users("excludeGroups"),
            include_roles: users("includeRoles"),
            exclude_roles: users("excludeRoles"),
            include_applications: joined(record, "/conditions/applications/includeApplications"),
            client_app_types: joined(record, "/conditions/clientAppTypes"),
            grant_operator: text(record, "/grantControls/operator"),
            built_in_controls: joined(record, "/grantControls/builtInControls"),
            session_controls: session_controls(record),
        }
    }
}

/// Names of the session controls that are present and enabled
fn session_controls(record: &Value) -> Option<String> {
    let controls = record.get("sessionControls")?.as_object()?;
    let enabled: Vec<&str> = controls
        .iter()
        .filter(|(_, control)| match control {
            Value::Null => false,
            Value::Object(fields) => fields
                .get("isEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            Value::Bool(enabled) => *enabled,
            _ => true,
        })
        .map(|(name, _)| name.as_str())
        .collect();
    if enabled.is_empty() {
        None
    } else {
        Some(enabled.join(";"))
    }
}

#[async_trait]
impl Report for ConditionalAccessReport {
    type Row = PolicyRow;

    fn name(&self) -> &'static str {
        "conditional-access"
    }

    fn queries(&self, config: &EngineConfig, _now: DateTime<Utc>) -> Vec<Query> {
        vec![Query::builder(config.endpoint("identity/conditionalAccess/policies"))
            .filter_opt(self.state.map(|state| Filter::eq("state", state.as_odata())))
            .build()]
    }

    async fn project(&self, _session: &GraphSession, records: Vec<Value>) -> Vec<PolicyRow> {
        records.iter().map(PolicyRow::from_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_filter() {
        let report = ConditionalAccessReport {
            state: Some(PolicyState::EnabledForReportingButNotEnforced),
        };
        let queries = report.queries(&EngineConfig::default(), Utc::now());
        assert_eq!(
            queries[0].filter().unwrap().as_str(),
            "state eq 'enabledForReportingButNotEnforced'"
        );
        assert!(ConditionalAccessReport::default()
            .queries(&EngineConfig::default(), Utc::now())[0]
            .filter()
            .is_none());
    }

    #[test]
    fn test_policy_row_projection() {
        let row = PolicyRow::from_record(&json!({
            "id": "pol-1",
            "displayName": "Require MFA for admins",
            "state": "enabled",
            "conditions": {
                "users": {
                    "includeRoles": ["62e90394-69f5-4237-9190-012177145e10"],
                    "excludeUsers": ["breakglass-1", "breakglass-2"]
                },
                "applications": {"includeApplications": ["All"]},
                "clientAppTypes": ["all"]
            },
            "grantControls": {"operator": "OR", "builtInControls": ["mfa"]},
            "sessionControls": {
                "signInFrequency": {"isEnabled": true, "value": 4},
                "persistentBrowser": {"isEnabled": false},
                "applicationEnforcedRestrictions": null
            }
        }));

        assert_eq!(row.exclude_users.as_deref(), Some("breakglass-1;breakglass-2"));
        assert_eq!(row.include_users, None);
        assert_eq!(row.include_applications.as_deref(), Some("All"));
        assert_eq!(row.grant_operator.as_deref(), Some("OR"));
        assert_eq!(row.built_in_controls.as_deref(), Some("mfa"));
        assert_eq!(row.session_controls.as_deref(), Some("signInFrequency"));
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{text, Report};
use crate::config::EngineConfig;
use crate::lookup::ObjectKind;
use crate::query::{Filter, Query};
use crate::session::GraphSession;
use crate::validation::validate_object_ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PermissionType {
    Delegated,
    Application,
}

/// Delegated (OAuth2) and application (app role) permission grants
///
/// With no service principals given, every delegated grant in the tenant is
/// returned; application grants are always per service principal.
#[derive(Debug, Clone, Default)]
pub struct AppPermissionsReport {
    pub service_principal_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PermissionRow {
    pub permission_type: PermissionType,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    /// Space-separated scopes, or the app role id
    pub permission: Option<String>,
    pub consent_type: Option<String>,
    pub principal_id: Option<String>,
    pub created_date_time: Option<String>,
    pub id: Option<String>,
}

fn permission_type(record: &Value) -> PermissionType {
    if record.get("appRoleId").is_some() {
        PermissionType::Application
    } else {
        PermissionType::Delegated
    }
}

#[async_trait]
impl Report for AppPermissionsReport {
    type Row = PermissionRow;

    fn name(&self) -> &'static str {
        "app-permissions"
    }

    fn validate(&self) -> Result<(), String> {
        validate_object_ids(&self.service_principal_ids)
    }

    fn queries(&self, config: &EngineConfig, _now: DateTime<Utc>) -> Vec<Query> {
        let grants = config.endpoint("oauth2PermissionGrants");
        if self.service_principal_ids.is_empty() {
            return vec![Query::builder(grants).build()];
        }

        let delegated = self.service_principal_ids.iter().map(|sp| {
            Query::builder(grants.as_str())
                .filter(Filter::eq("clientId", sp))
                .build()
        });
        let application = self.service_principal_ids.iter().map(|sp| {
            let path = format!("servicePrincipals/{}/appRoleAssignments", urlencoding::encode(sp));
            Query::builder(config.endpoint(&path)).build()
        });
        delegated.chain(application).collect()
    }

    async fn project(&self, session: &GraphSession, records: Vec<Value>) -> Vec<PermissionRow> {
        // App role assignments carry both display names; delegated grants carry neither
        let needs_lookup = |record: &Value, pointer: &str| match permission_type(record) {
            PermissionType::Delegated => text(record, pointer).unwrap_or_default(),
            PermissionType::Application => String::new(),
        };
        let client_ids: Vec<String> = records
            .iter()
            .map(|r| needs_lookup(r, "/clientId"))
            .collect();
        let resource_ids: Vec<String> = records
            .iter()
            .map(|r| needs_lookup(r, "/resourceId"))
            .collect();

        let client_names = session
            .resolve_names(ObjectKind::ServicePrincipal, &client_ids)
            .await;
        let resource_names = session
            .resolve_names(ObjectKind::ServicePrincipal, &resource_ids)
            .await;

        records
            .iter()
            .zip(client_names)
            .zip(resource_names)
            .map(|((record, client_name), resource_name)| match permission_type(record) {
                PermissionType::Delegated => PermissionRow {
                    permission_type: PermissionType::Delegated,
                    client_id: text(record, "/clientId"),
                    client_name,
                    resource_id: text(record, "/resourceId"),
                    resource_name,
                    permission: text(record, "/scope").map(|s| s.trim().to_string()),
                    consent_type: text(record, "/consentType"),
                    principal_id: text(record, "/principalId"),
                    created_date_time: None,
                    id: text(record, "/id"),
                },
                PermissionType::Application => PermissionRow {
                    permission_type: PermissionType::Application,
                    client_id: text(record, "/principalId"),
                    client_name: text(record, "/principalDisplayName"),
                    resource_id: text(record, "/resourceId"),
                    resource_name: text(record, "/resourceDisplayName"),
                    permission: text(record, "/appRoleId"),
                    consent_type: None,
                    principal_id: text(record, "/principalId"),
                    created_date_time: text(record, "/createdDateTime"),
                    id: text(record, "/id"),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delegated_queries_precede_application_queries() {
        let report = AppPermissionsReport {
            service_principal_ids: vec!["sp-1".to_string(), "sp-2".to_string()],
        };
        let urls: Vec<String> = report
            .queries(&EngineConfig::default(), Utc::now())
            .iter()
            .map(Query::to_url)
            .collect();

        assert_eq!(urls.len(), 4);
        assert!(urls[0].contains("oauth2PermissionGrants") && urls[0].contains("sp-1"));
        assert!(urls[1].contains("oauth2PermissionGrants") && urls[1].contains("sp-2"));
        assert!(urls[2].ends_with("/servicePrincipals/sp-1/appRoleAssignments"));
        assert!(urls[3].ends_with("/servicePrincipals/sp-2/appRoleAssignments"));
    }

    #[test]
    fn test_permission_type_detection() {
        assert_eq!(
            permission_type(&json!({"appRoleId": "x", "principalId": "p"})),
            PermissionType::Application
        );
        assert_eq!(
            permission_type(&json!({"clientId": "c", "scope": "Mail.Read"})),
            PermissionType::Delegated
        );
    }
}

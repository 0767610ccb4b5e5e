use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{text, Report};
use crate::config::EngineConfig;
use crate::lookup::ObjectKind;
use crate::query::{Filter, Query};
use crate::session::GraphSession;
use crate::validation::{validate_object_id, validate_object_ids};

/// Built-in role template ids treated as privileged
pub const PRIVILEGED_ROLE_TEMPLATES: &[(&str, &str)] = &[
    ("62e90394-69f5-4237-9190-012177145e10", "Global Administrator"),
    ("e8611ab8-c189-46e8-94e1-60213ab1f814", "Privileged Role Administrator"),
    ("7be44c8a-adaf-4e2a-84d6-ab2649e08a13", "Privileged Authentication Administrator"),
    ("194ae4cb-b126-40b2-bd5b-6091b380977d", "Security Administrator"),
    ("9b895d92-2cd3-44c7-9d02-a6ac2d5ea5c3", "Application Administrator"),
    ("158c047a-c907-4556-b7ef-446551a6b5f7", "Cloud Application Administrator"),
    ("c4e39bd9-1100-46d3-8c65-fb160da0071f", "Authentication Administrator"),
    ("b1be1c3e-b65d-4f19-8427-f6fa0d97feb9", "Conditional Access Administrator"),
    ("29232cdf-9323-42fd-ade2-1d097af3e4de", "Exchange Administrator"),
    ("f28a1f50-f6e7-4571-818b-6a12f2af6b6c", "SharePoint Administrator"),
    ("fe930be7-5e62-47db-91af-98c3a49a38b1", "User Administrator"),
    ("8ac3fc64-6eca-42ea-9e69-59f4c7b60eb2", "Hybrid Identity Administrator"),
];

/// Directory role assignments
#[derive(Debug, Clone, Default)]
pub struct RoleAssignmentsReport {
    /// One query per role definition; all assignments when empty
    pub role_definition_ids: Vec<String>,
    pub principal_id: Option<String>,
    /// Query the built-in privileged roles instead of `role_definition_ids`
    pub privileged_only: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoleAssignmentRow {
    pub role_definition_id: Option<String>,
    pub role_name: Option<String>,
    pub principal_id: Option<String>,
    pub principal_name: Option<String>,
    pub directory_scope_id: Option<String>,
    pub app_scope_id: Option<String>,
    pub id: Option<String>,
}

impl RoleAssignmentsReport {
    fn role_ids(&self) -> Vec<String> {
        if self.privileged_only {
            PRIVILEGED_ROLE_TEMPLATES
                .iter()
                .map(|(id, _)| id.to_string())
                .collect()
        } else {
            self.role_definition_ids.clone()
        }
    }
}

/// Well-known name for a built-in privileged role, without a lookup
fn builtin_role_name(role_id: &str) -> Option<String> {
    PRIVILEGED_ROLE_TEMPLATES
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(role_id))
        .map(|(_, name)| name.to_string())
}

#[async_trait]
impl Report for RoleAssignmentsReport {
    type Row = RoleAssignmentRow;

    fn name(&self) -> &'static str {
        "role-assignments"
    }

    fn validate(&self) -> Result<(), String> {
        validate_object_ids(&self.role_definition_ids)?;
        if let Some(principal) = &self.principal_id {
            validate_object_id(principal)?;
        }
        Ok(())
    }

    fn queries(&self, config: &EngineConfig, _now: DateTime<Utc>) -> Vec<Query> {
        let base = Query::builder(config.endpoint("roleManagement/directory/roleAssignments"))
            .filter_opt(
                self.principal_id
                    .as_deref()
                    .map(|principal| Filter::eq("principalId", principal)),
            );

        let role_ids = self.role_ids();
        if role_ids.is_empty() {
            return vec![base.build()];
        }

        role_ids
            .iter()
            .map(|role| base.clone().filter(Filter::eq("roleDefinitionId", role)).build())
            .collect()
    }

    async fn project(&self, session: &GraphSession, records: Vec<Value>) -> Vec<RoleAssignmentRow> {
        let role_ids: Vec<String> = records
            .iter()
            .map(|r| text(r, "/roleDefinitionId").unwrap_or_default())
            .collect();
        let principal_ids: Vec<String> = records
            .iter()
            .map(|r| text(r, "/principalId").unwrap_or_default())
            .collect();

        // Built-in privileged roles are named locally; only custom roles need a lookup
        let unknown_role_ids: Vec<String> = role_ids
            .iter()
            .map(|id| match builtin_role_name(id) {
                Some(_) => String::new(),
                None => id.clone(),
            })
            .collect();

        let role_names = session
            .resolve_names(ObjectKind::RoleDefinition, &unknown_role_ids)
            .await;
        let principal_names = session
            .resolve_names(ObjectKind::DirectoryObject, &principal_ids)
            .await;

        records
            .iter()
            .zip(role_names)
            .zip(principal_names)
            .map(|((record, role_name), principal_name)| {
                let role_id = text(record, "/roleDefinitionId");
                RoleAssignmentRow {
                    role_name: role_id
                        .as_deref()
                        .and_then(builtin_role_name)
                        .or(role_name),
                    role_definition_id: role_id,
                    principal_id: text(record, "/principalId"),
                    principal_name,
                    directory_scope_id: text(record, "/directoryScopeId"),
                    app_scope_id: text(record, "/appScopeId"),
                    id: text(record, "/id"),
                }
            })
            .collect()
    }
}

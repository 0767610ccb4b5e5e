//! Report adapters
//!
//! Each report turns operator parameters into one or more [`Query`] values and
//! projects the raw records into flat rows. Fetching, paging and retries are
//! the session's job; adapters never see an HTTP response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::query::Query;
use crate::session::GraphSession;

mod audits;
mod conditional_access;
mod domains;
mod mfa;
mod permissions;
mod roles;
mod sign_ins;

pub use audits::{AuditRow, AuditsReport};
pub use conditional_access::{ConditionalAccessReport, PolicyRow, PolicyState};
pub use domains::{DomainRow, DomainsReport};
pub use mfa::{MfaReport, MfaRow};
pub use permissions::{AppPermissionsReport, PermissionRow, PermissionType};
pub use roles::{RoleAssignmentRow, RoleAssignmentsReport, PRIVILEGED_ROLE_TEMPLATES};
pub use sign_ins::{SignInRow, SignInStatus, SignInsReport};

/// A report type: query construction plus projection
#[async_trait]
pub trait Report: Send + Sync {
    type Row: Serialize + Send;

    fn name(&self) -> &'static str;

    /// Checks operator input before anything is sent
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// The queries to run, in output order
    fn queries(&self, config: &EngineConfig, now: DateTime<Utc>) -> Vec<Query>;

    /// Maps raw records to rows, preserving their order
    async fn project(&self, session: &GraphSession, records: Vec<Value>) -> Vec<Self::Row>;
}

/// String at a JSON pointer; numbers and booleans are rendered as text
pub(crate) fn text(record: &Value, pointer: &str) -> Option<String> {
    match record.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn boolean(record: &Value, pointer: &str) -> Option<bool> {
    record.pointer(pointer).and_then(Value::as_bool)
}

pub(crate) fn integer(record: &Value, pointer: &str) -> Option<i64> {
    record.pointer(pointer).and_then(Value::as_i64)
}

/// Joins a string array at a JSON pointer with `;`
pub(crate) fn joined(record: &Value, pointer: &str) -> Option<String> {
    let items: Vec<&str> = record
        .pointer(pointer)?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items.join(";"))
    }
}

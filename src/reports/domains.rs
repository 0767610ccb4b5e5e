use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{boolean, integer, joined, text, Report};
use crate::config::EngineConfig;
use crate::query::Query;
use crate::session::GraphSession;

/// Every domain registered to the tenant
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainsReport;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DomainRow {
    pub id: Option<String>,
    pub authentication_type: Option<String>,
    pub is_default: Option<bool>,
    pub is_initial: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_root: Option<bool>,
    pub supported_services: Option<String>,
    pub password_validity_period_in_days: Option<i64>,
}

impl DomainRow {
    fn from_record(record: &Value) -> Self {
        Self {
            id: text(record, "/id"),
            authentication_type: text(record, "/authenticationType"),
            is_default: boolean(record, "/isDefault"),
            is_initial: boolean(record, "/isInitial"),
            is_verified: boolean(record, "/isVerified"),
            is_root: boolean(record, "/isRoot"),
            supported_services: joined(record, "/supportedServices"),
            password_validity_period_in_days: integer(record, "/passwordValidityPeriodInDays"),
        }
    }
}

#[async_trait]
impl Report for DomainsReport {
    type Row = DomainRow;

    fn name(&self) -> &'static str {
        "domains"
    }

    fn queries(&self, config: &EngineConfig, _now: DateTime<Utc>) -> Vec<Query> {
        vec![Query::builder(config.endpoint("domains")).build()]
    }

    async fn project(&self, _session: &GraphSession, records: Vec<Value>) -> Vec<DomainRow> {
        records.iter().map(DomainRow::from_record).collect()
    }
}

// Entrascope: incident-response collection from a cloud directory tenant
// Exposes the fetch engine and report adapters as a library

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod lookup;
pub mod output;
pub mod pagination;
pub mod query;
pub mod rate_limit;
pub mod reports;
pub mod retry;
pub mod sanitize;
pub mod session;
pub mod tenant;
pub mod validation;

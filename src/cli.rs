//! Command-line interface for the entrascope collection tool
//!
//! Global options describe how to reach and authenticate against the tenant
//! and how patient the engine should be; each subcommand selects one report
//! and carries that report's filters.
//!
//! # Credentials
//!
//! Either a pre-acquired bearer token (`--access-token`) or an app
//! registration (`--client-id` plus `--client-secret`) must be supplied. All
//! three can come from the environment so secrets stay out of shell history.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{EngineConfig, DEFAULT_AUTHORITY_URL, DEFAULT_GRAPH_URL};
use crate::query::{DateRange, MAX_DAYS_AGO};
use crate::reports::{PolicyState, SignInStatus};

/// Main command-line interface structure for entrascope
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use entrascope::cli::{Cli, Commands};
///
/// let cli = Cli::parse_from([
///     "entrascope",
///     "--tenant", "contoso.onmicrosoft.com",
///     "--access-token", "eyJ...",
///     "domains",
/// ]);
/// assert!(matches!(cli.command, Commands::Domains));
/// println!("timeout: {:?}", cli.engine_config().timeout);
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "entrascope",
    about = "Incident-response collection from a cloud directory tenant",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Tenant GUID or any verified domain of the tenant
    #[arg(long, env = "ENTRASCOPE_TENANT", global = true)]
    pub tenant: Option<String>,

    /// Application (client) id for the client-credentials flow
    #[arg(long, env = "ENTRASCOPE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Client secret for the client-credentials flow
    #[arg(long, env = "ENTRASCOPE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-acquired bearer token; it cannot be refreshed
    #[arg(long, env = "ENTRASCOPE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub access_token: Option<String>,

    /// Account hint passed to interactive refreshes
    #[arg(long, global = true)]
    pub login_hint: Option<String>,

    /// Request timeout in milliseconds
    #[arg(short = 't', long, default_value = "30000", global = true)]
    pub timeout_ms: u64,

    /// Graph base URL
    #[arg(long, default_value = DEFAULT_GRAPH_URL, global = true)]
    pub graph_url: String,

    /// Identity platform base URL
    #[arg(long, default_value = DEFAULT_AUTHORITY_URL, global = true)]
    pub authority_url: String,

    /// Retry budget for unclassified failures, shared by the whole fetch
    #[arg(long, default_value = "5", global = true)]
    pub max_retries: u32,

    /// Wait after a throttling response, in milliseconds
    #[arg(long, default_value = "5000", global = true)]
    pub throttle_delay_ms: u64,

    /// Display-name lookups allowed in flight at once
    #[arg(long, default_value = "1", global = true)]
    pub lookup_concurrency: usize,

    /// Output file (JSON Lines); pretty JSON to stdout when omitted
    #[arg(short, long, global = true)]
    pub output_file: Option<PathBuf>,
}

impl Cli {
    /// Folds the global flags into an [`EngineConfig`]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::builder()
            .graph_url(self.graph_url.as_str())
            .authority_url(self.authority_url.as_str())
            .timeout(Duration::from_millis(self.timeout_ms))
            .max_retries(self.max_retries)
            .throttle_delay(Duration::from_millis(self.throttle_delay_ms))
            .lookup_concurrency(self.lookup_concurrency)
            .login_hint(self.login_hint.clone())
            .build()
    }
}

/// Relative window shared by the log reports
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct DateRangeArgs {
    /// Recent edge of the window, in days before now
    #[arg(long, value_parser = days_ago_parser())]
    pub from_days_ago: Option<u32>,

    /// Older edge of the window, in days before now
    #[arg(long, value_parser = days_ago_parser())]
    pub to_days_ago: Option<u32>,
}

fn days_ago_parser() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(0..=i64::from(MAX_DAYS_AGO))
}

impl From<DateRangeArgs> for DateRange {
    fn from(args: DateRangeArgs) -> Self {
        DateRange::new(args.from_days_ago, args.to_days_ago)
    }
}

/// Available reports
///
/// ```text
/// entrascope --tenant contoso.com sign-ins --user-id <guid> --to-days-ago 7 --status failure
/// entrascope --tenant contoso.com role-assignments --privileged-only -o roles.jsonl
/// entrascope tenant-id --domain contoso.com
/// ```
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign-in events
    SignIns {
        /// User object id; repeat for several users
        #[arg(long = "user-id")]
        user_ids: Vec<String>,

        /// Restrict to one application id
        #[arg(long)]
        app_id: Option<String>,

        #[command(flatten)]
        range: DateRangeArgs,

        #[arg(long, value_enum, default_value_t = SignInStatus::All)]
        status: SignInStatus,
    },
    /// Directory audit events
    Audits {
        /// Initiating user object id; repeat for several users
        #[arg(long = "initiated-by")]
        initiated_by: Vec<String>,

        /// Target object id; repeat for several targets
        #[arg(long = "target-id")]
        target_ids: Vec<String>,

        /// Audit category, e.g. RoleManagement
        #[arg(long)]
        category: Option<String>,

        #[command(flatten)]
        range: DateRangeArgs,
    },
    /// Directory role assignments
    RoleAssignments {
        /// Role definition id; repeat for several roles
        #[arg(long = "role-id")]
        role_ids: Vec<String>,

        #[arg(long)]
        principal_id: Option<String>,

        /// Only the built-in privileged roles
        #[arg(long)]
        privileged_only: bool,
    },
    /// Delegated and application permission grants
    AppPermissions {
        /// Service principal object id; repeat for several
        #[arg(long = "service-principal-id")]
        service_principal_ids: Vec<String>,
    },
    /// Registered domains
    Domains,
    /// Authentication method registration
    Mfa {
        /// User principal name; repeat for several users
        #[arg(long = "upn")]
        user_principal_names: Vec<String>,

        /// Only users with (true) or without (false) MFA registered
        #[arg(long)]
        mfa_registered: Option<bool>,
    },
    /// Conditional access policies
    ConditionalAccess {
        #[arg(long, value_enum)]
        state: Option<PolicyState>,
    },
    /// Resolve a domain to its tenant id
    TenantId {
        #[arg(short, long)]
        domain: String,
    },
}

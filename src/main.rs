use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use tokio::runtime::Builder;
use tracing::{debug, info, warn};

use entrascope::auth::{ClientCredentialsProvider, StaticTokenProvider, TokenProvider};
use entrascope::cli::{Cli, Commands};
use entrascope::error::FetchError;
use entrascope::http::HttpClient;
use entrascope::output;
use entrascope::reports::{
    AppPermissionsReport, AuditsReport, ConditionalAccessReport, DomainsReport, MfaReport,
    Report, RoleAssignmentsReport, SignInsReport,
};
use entrascope::sanitize::sanitize_error;
use entrascope::session::GraphSession;
use entrascope::tenant::TenantResolver;

fn main() -> Result<()> {
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    // Requests are awaited one after another; a small pool is plenty
    let worker_threads = std::cmp::min(num_cpus, 4);

    debug!("Configuring Tokio runtime with {} worker threads", worker_threads);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    run(cli).await.map_err(|e| {
        if let Some(fetch) = e.downcast_ref::<FetchError>() {
            if fetch.is_fatal_for_report() {
                warn!(
                    "re-running will not help; check the app's permissions and the report filters"
                );
            }
        }
        anyhow!(sanitize_error(&format!("{:#}", e)))
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.engine_config();
    let http = HttpClient::new(config.timeout)?;
    let resolver = TenantResolver::new(http.inner().clone(), config.authority_url.as_str());

    if let Commands::TenantId { domain } = &cli.command {
        let tenant = resolver.resolve_domain(domain).await?;
        println!("{}", tenant);
        return Ok(());
    }

    let tenant_arg = match &cli.tenant {
        Some(tenant) => tenant,
        None => bail!("--tenant (or ENTRASCOPE_TENANT) is required"),
    };
    let tenant = resolver.resolve(tenant_arg).await?;
    info!(%tenant, "resolved tenant");

    let credentials = (&cli.access_token, &cli.client_id, &cli.client_secret);
    let provider: Arc<dyn TokenProvider> = match credentials {
        (Some(token), _, _) => Arc::new(StaticTokenProvider::new(token.as_str())),
        (None, Some(client_id), Some(client_secret)) => Arc::new(ClientCredentialsProvider::new(
            http.inner().clone(),
            config.authority_url.as_str(),
            client_id.as_str(),
            client_secret.as_str(),
        )),
        _ => bail!("supply --access-token, or --client-id with --client-secret"),
    };

    let session = GraphSession::with_http(config, http, provider, tenant);
    let output_file = cli.output_file.as_deref();

    match cli.command {
        Commands::SignIns {
            user_ids,
            app_id,
            range,
            status,
        } => {
            let report = SignInsReport {
                user_ids,
                app_id,
                range: range.into(),
                status,
            };
            export(&session, &report, output_file).await
        }
        Commands::Audits {
            initiated_by,
            target_ids,
            category,
            range,
        } => {
            let report = AuditsReport {
                initiated_by,
                target_ids,
                category,
                range: range.into(),
            };
            export(&session, &report, output_file).await
        }
        Commands::RoleAssignments {
            role_ids,
            principal_id,
            privileged_only,
        } => {
            let report = RoleAssignmentsReport {
                role_definition_ids: role_ids,
                principal_id,
                privileged_only,
            };
            export(&session, &report, output_file).await
        }
        Commands::AppPermissions {
            service_principal_ids,
        } => {
            let report = AppPermissionsReport {
                service_principal_ids,
            };
            export(&session, &report, output_file).await
        }
        Commands::Domains => export(&session, &DomainsReport, output_file).await,
        Commands::Mfa {
            user_principal_names,
            mfa_registered,
        } => {
            let report = MfaReport {
                user_principal_names,
                mfa_registered,
            };
            export(&session, &report, output_file).await
        }
        Commands::ConditionalAccess { state } => {
            export(&session, &ConditionalAccessReport { state }, output_file).await
        }
        Commands::TenantId { .. } => Ok(()),
    }
}

/// Validates, fetches and writes one report
async fn export<R: Report>(
    session: &GraphSession,
    report: &R,
    output_file: Option<&Path>,
) -> Result<()> {
    report.validate().map_err(anyhow::Error::msg)?;

    let rows = session.run(report).await?;
    let written = output::write_rows(&rows, output_file).await?;
    info!(report = report.name(), rows = written, "export complete");
    Ok(())
}

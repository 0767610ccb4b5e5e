use anyhow::Result;
use clap::Parser;
use entrascope::cli::{Cli, Commands};
use entrascope::config::DEFAULT_GRAPH_URL;
use entrascope::reports::{PolicyState, SignInStatus};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_cli_defaults() -> Result<()> {
    let cli = Cli::try_parse_from(["entrascope", "--tenant", "contoso.com", "domains"])?;

    assert!(matches!(cli.command, Commands::Domains));
    assert_eq!(cli.tenant.as_deref(), Some("contoso.com"));
    assert_eq!(cli.timeout_ms, 30000);
    assert_eq!(cli.max_retries, 5);
    assert_eq!(cli.throttle_delay_ms, 5000);
    assert_eq!(cli.lookup_concurrency, 1);
    assert_eq!(cli.graph_url, DEFAULT_GRAPH_URL);
    assert!(cli.output_file.is_none());

    Ok(())
}

#[test]
fn test_sign_ins_command() -> Result<()> {
    let cli = Cli::try_parse_from([
        "entrascope",
        "sign-ins",
        "--user-id",
        "11111111-1111-1111-1111-111111111111",
        "--user-id",
        "22222222-2222-2222-2222-222222222222",
        "--to-days-ago",
        "7",
        "--status",
        "failure",
        "--output-file",
        "signins.jsonl",
    ])?;

    match &cli.command {
        Commands::SignIns {
            user_ids,
            app_id,
            range,
            status,
        } => {
            assert_eq!(user_ids.len(), 2);
            assert_eq!(user_ids[1], "22222222-2222-2222-2222-222222222222");
            assert!(app_id.is_none());
            assert_eq!(range.from_days_ago, None);
            assert_eq!(range.to_days_ago, Some(7));
            assert_eq!(*status, SignInStatus::Failure);
        }
        other => panic!("Expected SignIns command, got {:?}", other),
    }
    // Global flags are accepted after the subcommand
    assert_eq!(cli.output_file, Some(PathBuf::from("signins.jsonl")));

    Ok(())
}

#[test]
fn test_role_assignments_and_conditional_access() -> Result<()> {
    let cli = Cli::try_parse_from(["entrascope", "role-assignments", "--privileged-only"])?;
    match &cli.command {
        Commands::RoleAssignments {
            role_ids,
            privileged_only,
            ..
        } => {
            assert!(role_ids.is_empty());
            assert!(*privileged_only);
        }
        other => panic!("Expected RoleAssignments command, got {:?}", other),
    }

    let cli = Cli::try_parse_from([
        "entrascope",
        "conditional-access",
        "--state",
        "enabled-for-reporting-but-not-enforced",
    ])?;
    match &cli.command {
        Commands::ConditionalAccess { state } => {
            assert_eq!(*state, Some(PolicyState::EnabledForReportingButNotEnforced));
        }
        other => panic!("Expected ConditionalAccess command, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_engine_config_from_flags() -> Result<()> {
    let cli = Cli::try_parse_from([
        "entrascope",
        "--graph-url",
        "http://127.0.0.1:8080/v1.0",
        "--timeout-ms",
        "1500",
        "--max-retries",
        "0",
        "--throttle-delay-ms",
        "25",
        "--lookup-concurrency",
        "4",
        "--login-hint",
        "responder@contoso.com",
        "mfa",
        "--upn",
        "adele@contoso.com",
        "--mfa-registered",
        "false",
    ])?;

    let config = cli.engine_config();
    assert_eq!(config.graph_url, "http://127.0.0.1:8080/v1.0");
    assert_eq!(config.timeout, Duration::from_millis(1500));
    // A zero budget would abort on the first transient failure without trying
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.retry.throttle_delay, Duration::from_millis(25));
    assert_eq!(config.lookup_concurrency, 4);
    assert_eq!(config.login_hint.as_deref(), Some("responder@contoso.com"));

    match &cli.command {
        Commands::Mfa {
            user_principal_names,
            mfa_registered,
        } => {
            assert_eq!(user_principal_names, &vec!["adele@contoso.com".to_string()]);
            assert_eq!(*mfa_registered, Some(false));
        }
        other => panic!("Expected Mfa command, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_cli_errors() {
    // No subcommand
    assert!(Cli::try_parse_from(["entrascope"]).is_err());

    // tenant-id needs a domain
    assert!(Cli::try_parse_from(["entrascope", "tenant-id"]).is_err());

    // Unknown sign-in status
    assert!(Cli::try_parse_from(["entrascope", "sign-ins", "--status", "maybe"]).is_err());

    // Non-numeric timeout
    assert!(Cli::try_parse_from(["entrascope", "--timeout-ms", "soon", "domains"]).is_err());

    // Day offsets past the supported window
    let huge = ["entrascope", "sign-ins", "--to-days-ago", "4000000000"];
    assert!(Cli::try_parse_from(huge).is_err());
    let huge = ["entrascope", "audits", "--from-days-ago", "36501"];
    assert!(Cli::try_parse_from(huge).is_err());
    let edge = ["entrascope", "audits", "--to-days-ago", "36500"];
    assert!(Cli::try_parse_from(edge).is_ok());
}

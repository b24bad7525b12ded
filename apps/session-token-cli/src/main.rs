#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Session token tool
//!
//! Issues and verifies signed session tokens with the same configuration
//! services use (`--config` YAML file plus `SESSION_*` environment variables).
//!
//! # Usage
//!
//! ```bash
//! export SESSION_SIGNING_KEY=secret
//!
//! # Issue a token for a user
//! session-token issue --user-id 42 --scope "read write" --auth-type u
//!
//! # Verify it and require a scope
//! session-token verify --scope write "$TOKEN"
//! ```

// CLI tools are expected to print to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use modkit_session::{AuthType, Claims, Interactor, SessionConfig, SessionError, authorize_scopes};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-token")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the default token lifetime in seconds
    #[arg(long, global = true)]
    ttl: Option<u64>,

    /// Override the leeway for time-based checks in seconds
    #[arg(long, global = true)]
    leeway: Option<u64>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign a new token and print it
    Issue(IssueArgs),
    /// Verify a token and print its claims as JSON
    Verify {
        /// Token to verify (with or without `Bearer ` prefix)
        token: String,

        /// Scope the token must grant (can be specified multiple times)
        #[arg(long, short = 's', action = clap::ArgAction::Append)]
        scope: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct IssueArgs {
    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    project_id: Option<String>,

    #[arg(long)]
    client_id: Option<String>,

    /// Space or comma separated scopes
    #[arg(long)]
    scope: Option<String>,

    /// `u`, `a`, `i` or any custom value
    #[arg(long)]
    auth_type: Option<String>,

    #[arg(long)]
    issuer: Option<String>,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    audience: Option<String>,

    /// Lifetime of this token in seconds (defaults to the configured TTL)
    #[arg(long)]
    expires_in: Option<i64>,

    /// Seconds from now before which the token is not valid
    #[arg(long)]
    not_before_in: Option<i64>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    if let Some(path) = &cli.config {
        anyhow::ensure!(
            path.is_file(),
            "config file does not exist: {}",
            path.display()
        );
    }

    let mut figment: Figment = SessionConfig::figment(cli.config.as_deref());
    if let Some(ttl) = cli.ttl {
        figment = figment.merge(("ttl_seconds", ttl));
    }
    if let Some(leeway) = cli.leeway {
        figment = figment.merge(("leeway_seconds", leeway));
    }

    SessionConfig::from_figment(&figment).context("invalid session configuration")
}

fn build_claims(args: IssueArgs, now: i64) -> Claims {
    let mut builder = Claims::builder();
    if let Some(user_id) = args.user_id {
        builder = builder.user_id(user_id);
    }
    if let Some(project_id) = args.project_id {
        builder = builder.project_id(project_id);
    }
    if let Some(client_id) = args.client_id {
        builder = builder.client_id(client_id);
    }
    if let Some(scope) = args.scope {
        builder = builder.scope(scope);
    }
    if let Some(auth_type) = args.auth_type {
        builder = builder.custom_auth_type(AuthType::from(auth_type));
    }
    if let Some(issuer) = args.issuer {
        builder = builder.issuer(issuer);
    }
    if let Some(subject) = args.subject {
        builder = builder.subject(subject);
    }
    if let Some(audience) = args.audience {
        builder = builder.audience(audience);
    }
    if let Some(expires_in) = args.expires_in {
        builder = builder.ttl(expires_in);
    }
    if let Some(not_before_in) = args.not_before_in {
        builder = builder.not_before(now.saturating_add(not_before_in));
    }
    builder.build()
}

fn report(err: &SessionError) {
    eprintln!(
        "error: {} ({}): {}",
        err.kind().code(),
        err.status().as_u16(),
        err.message()
    );
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let interactor = Interactor::from_config(&config)?;
    tracing::debug!(
        ttl = ?interactor.ttl(),
        leeway = ?interactor.leeway(),
        "session interactor ready"
    );

    match cli.command {
        Commands::Issue(args) => {
            let claims = build_claims(args, modkit_session::claims::now_unix());
            match interactor.issue(claims) {
                Ok(token) => {
                    println!("{token}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    report(&err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Verify { token, scope } => {
            let token = token.strip_prefix("Bearer ").unwrap_or(&token).trim();
            let verified = interactor.verify(token).and_then(|claims| {
                authorize_scopes(&claims, scope.as_slice())?;
                Ok(claims)
            });
            match verified {
                Ok(claims) => {
                    println!("{}", serde_json::to_string_pretty(&claims)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    report(&err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_issue_flags() {
        let cli = Cli::try_parse_from([
            "session-token",
            "-vv",
            "issue",
            "--user-id",
            "42",
            "--scope",
            "read write",
            "--auth-type",
            "a",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Issue(args) = cli.command else {
            panic!("expected issue command");
        };
        let claims = build_claims(args, 0);
        assert_eq!(claims.user_id(), "42");
        assert!(claims.check_scope_in_allowed("write"));
        assert!(claims.is_app_auth());
    }

    #[test]
    fn relative_times_are_applied() {
        let cli = Cli::try_parse_from([
            "session-token",
            "issue",
            "--expires-in",
            "60",
            "--not-before-in",
            "30",
        ])
        .unwrap();
        let Commands::Issue(args) = cli.command else {
            panic!("expected issue command");
        };

        let claims = build_claims(args, 1_000);
        assert_eq!(claims.expires_at(), claims.issued_at() + 60);
        assert_eq!(claims.not_before(), 1_030);
    }

    #[test]
    fn verify_collects_scopes() {
        let cli = Cli::try_parse_from([
            "session-token",
            "verify",
            "-s",
            "read",
            "-s",
            "write",
            "tok",
        ])
        .unwrap();
        let Commands::Verify { token, scope } = cli.command else {
            panic!("expected verify command");
        };
        assert_eq!(token, "tok");
        assert_eq!(scope, ["read", "write"]);
    }
}

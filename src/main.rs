use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use pr_report::config::{self, Config};
use pr_report::github::{GitHubApi, GitHubClient, PrState};
use pr_report::report::{self, ReportAssembler};
use pr_report::resolve::{self, ReportArgs, ResolveError};

/// PR Report — export the pull requests of a GitHub organization, user list
/// or team to a CSV file.
#[derive(Parser, Debug)]
#[command(name = "pr-report", version, about)]
struct Cli {
    /// Comma separated logins to query for
    #[arg(short, long)]
    user: Option<String>,

    /// Organization id. Required
    #[arg(short, long)]
    org: Option<String>,

    /// Comma separated team ids (or slugs) to query for
    #[arg(short, long)]
    team: Option<String>,

    /// Token to use in API calls. Can be saved in ~/.pr_token
    #[arg(short = 'k', long)]
    token: Option<String>,

    /// State of PRs
    #[arg(short, long, value_enum, default_value_t = PrState::Open)]
    state: PrState,

    /// Only PRs created before DATE (YYYY-MM-DD)
    #[arg(short, long, value_name = "DATE")]
    before: Option<String>,

    /// Only PRs created after DATE (YYYY-MM-DD)
    #[arg(short, long, value_name = "DATE")]
    after: Option<String>,

    /// Add each repository's CODEOWNERS to the report
    #[arg(long)]
    codeowners: bool,

    /// Report path [default: pr_report.csv]
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn report_args(&self) -> ReportArgs {
        ReportArgs {
            org: self.org.clone(),
            user: self.user.clone(),
            team: self.team.clone(),
            state: self.state,
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let filter = match resolve::validate(&cli.report_args()) {
        Ok(filter) => filter,
        Err(err) => exit_with_usage(&err),
    };

    let _main_span = info_span!("pr_report", org = %filter.org).entered();

    info!("loading configuration");
    let config = Config::load()?;
    let token = config::resolve_token(cli.token.as_deref())?;
    let client = GitHubClient::new(&config.github.api_url, token)?;

    info!("resolving authors");
    let excluded = config.excluded_users();
    let request = match resolve::resolve_identities(filter, &client, &excluded).await {
        Ok(request) => request,
        Err(err) if err.is_usage_error() => exit_with_usage(&err),
        Err(err) => return Err(err.into()),
    };

    let query = request.query();
    debug!(query = %query, authors = request.identities.len(), "built search query");

    info!("searching pull requests");
    let items = client.search_pull_requests(&query).await?;
    info!(items = items.len(), "search complete");

    let mut assembler = ReportAssembler::new(&request.identities);
    if cli.codeowners {
        assembler = assembler.with_ownership(&config.report.ownership_file);
    }
    let records = assembler.assemble(&client, items).await?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| config.report.output.clone());
    report::write_csv(&records, &output)?;
    info!(records = records.len(), path = %output.display(), "done");

    Ok(())
}

/// Report a bad command line and exit with status 1.
fn exit_with_usage(err: &ResolveError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    if matches!(err, ResolveError::Configuration(_)) {
        eprintln!("{}", Cli::command().render_usage());
    }
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pr-report", "--org", "acme"]).unwrap();
        let args = cli.report_args();
        assert_eq!(args.org.as_deref(), Some("acme"));
        assert_eq!(args.state, PrState::Open);
        assert!(!cli.codeowners);
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::try_parse_from([
            "pr-report", "-o", "acme", "-u", "alice,bob", "-k", "tok", "-s", "closed", "-b",
            "2024-02-01", "-a", "2024-01-01", "--codeowners",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice,bob"));
        assert_eq!(cli.token.as_deref(), Some("tok"));
        assert_eq!(cli.state, PrState::Closed);
        assert!(cli.codeowners);
    }

    #[test]
    fn test_cli_conflict_left_to_resolver() {
        let cli = Cli::try_parse_from(["pr-report", "-o", "acme", "-u", "alice", "-t", "42"])
            .unwrap();
        let err = resolve::validate(&cli.report_args()).unwrap_err();
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_cli_rejects_unknown_state() {
        assert!(Cli::try_parse_from(["pr-report", "-o", "acme", "-s", "merged"]).is_err());
    }
}

//! Search command implementation

use crate::auth::CredentialPool;
use crate::engine::{
    DelaySpec, EngineConfig, IncompleteReason, Orchestrator, ResultStore, RunSummary,
};
use crate::fetcher::github_http::GitHubClient;
use crate::output::{open_sinks, OutputFormat};
use crate::shutdown::SharedShutdown;
use crate::{SearchKind, SearchWindow};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{Cli, CliError};

/// First year searched when no range is given
pub const DEFAULT_START_YEAR: i32 = 2015;

/// Parse `2023` or `2020-2024` into an inclusive year range.
fn parse_year_range(s: &str) -> Result<(i32, i32), String> {
    let parse = |part: &str| -> Result<i32, String> {
        part.trim()
            .parse::<i32>()
            .map_err(|_| format!("'{s}' is not a year or year range (e.g. 2023 or 2020-2024)"))
    };
    let (start, end) = match s.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let year = parse(s)?;
            (year, year)
        }
    };
    if start > end {
        return Err(format!("year range {start}-{end} is inverted"));
    }
    Ok((start, end))
}

/// Search command arguments
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Term to search for: a domain, a keyword, or a query with qualifiers
    #[arg(short = 'q', long)]
    pub query: String,

    /// Year or year range to search, e.g. 2023 or 2020-2024
    #[arg(short = 'y', long, value_parser = parse_year_range)]
    pub years: Option<(i32, i32)>,

    /// First creation date to search (YYYY-MM-DD); overrides --years
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Last creation date to search (YYYY-MM-DD); overrides --years
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Search only repositories
    #[arg(long, conflicts_with_all = ["gists_only", "code_only"])]
    pub repos_only: bool,

    /// Search only gists
    #[arg(long, conflicts_with = "code_only")]
    pub gists_only: bool,

    /// Search only code
    #[arg(long)]
    pub code_only: bool,

    /// Delay between requests in seconds: fixed ("2.5") or a random range ("1.5-3.5")
    #[arg(short = 'D', long)]
    pub delay: Option<DelaySpec>,

    /// Output path without extension
    #[arg(short = 'o', long, default_value = "results")]
    pub output: PathBuf,

    /// Output format: csv, jsonl, txt, html, or all
    #[arg(short = 'f', long, default_value = "csv")]
    pub format: OutputFormat,

    /// Maximum retries of a window after transient failures (range: 1-20)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Disable the progress spinner
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl SearchArgs {
    /// Kinds selected by the mode flags, in search order.
    pub fn kinds(&self) -> Vec<SearchKind> {
        if self.repos_only {
            vec![SearchKind::Repository]
        } else if self.gists_only {
            vec![SearchKind::Gist]
        } else if self.code_only {
            vec![SearchKind::Code]
        } else {
            SearchKind::ALL.to_vec()
        }
    }

    /// Date window to search, with the end clamped to `today`.
    pub fn window(&self, today: NaiveDate) -> Result<SearchWindow, CliError> {
        let (start_year, end_year) = self
            .years
            .unwrap_or((DEFAULT_START_YEAR, today.year()));

        let start = match self.since {
            Some(date) => date,
            None => NaiveDate::from_ymd_opt(start_year, 1, 1).ok_or_else(|| {
                CliError::InvalidArgument(format!("year {start_year} is out of range"))
            })?,
        };
        let end = match self.until {
            Some(date) => date,
            None => NaiveDate::from_ymd_opt(end_year, 12, 31).ok_or_else(|| {
                CliError::InvalidArgument(format!("year {end_year} is out of range"))
            })?,
        };

        Ok(SearchWindow::new(start, end.min(today))?)
    }

    /// Apply flag overrides to `config`.
    pub fn apply_overrides(&self, config: &mut EngineConfig) -> Result<(), CliError> {
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        config.validate()?;
        Ok(())
    }

    /// Execute the search command.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let mut config = cli.engine_config()?;
        self.apply_overrides(&mut config)?;

        if let Some(addr) = self.metrics_addr {
            if let Err(e) = crate::metrics::init_metrics(addr).await {
                warn!(error = %e, "Failed to start metrics exporter - continuing without it");
            }
        }

        let window = self.window(Utc::now().date_naive())?;
        let kinds = self.kinds();
        let pool = CredentialPool::new(cli.credentials()?, &config)?;
        let provider = GitHubClient::new(&config)?;
        let store = ResultStore::with_sink(open_sinks(&self.output, self.format)?);

        info!(
            query = %self.query,
            window = %window,
            credentials = pool.len(),
            delay = %config.delay,
            output = %self.output.display(),
            format = %self.format,
            "Search configured"
        );

        let mut orchestrator =
            Orchestrator::new(provider, pool, store, config)?.with_shutdown(shutdown);
        if !self.no_progress {
            orchestrator = orchestrator.with_progress(create_spinner(&self.query));
        }

        match orchestrator.run(&self.query, &kinds, window).await {
            Ok(summary) => {
                log_summary(&summary);
                if self.json {
                    let json = serde_json::to_string_pretty(&summary).map_err(|e| {
                        CliError::InvalidArgument(format!("Failed to serialize summary: {e}"))
                    })?;
                    println!("{json}");
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    items = orchestrator.store().len(),
                    "Search stopped early; items found so far were written"
                );
                for credential in orchestrator.pool().report() {
                    warn!(
                        credential = %credential.masked,
                        state = ?credential.state,
                        requests = credential.requests,
                        "Credential final state"
                    );
                }
                Err(e.into())
            }
        }
    }
}

/// Spinner shown while the search runs
fn create_spinner(query: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(format!("searching \"{query}\""));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Log the outcome of a run.
pub fn log_summary(summary: &RunSummary) {
    for (kind, count) in &summary.items_by_kind {
        info!(%kind, items = count, "Items discovered");
    }
    for warning in &summary.warnings {
        match warning.reason {
            IncompleteReason::DayOverCap => warn!(
                kind = %warning.kind,
                date = %warning.window,
                total_count = warning.total_count,
                fetched = warning.fetched,
                "Incomplete day: more matches than the provider exposes"
            ),
            IncompleteReason::Shortfall => warn!(
                kind = %warning.kind,
                window = %warning.window,
                total_count = warning.total_count,
                fetched = warning.fetched,
                "Incomplete window: provider served fewer items than reported"
            ),
        }
    }
    for failure in &summary.failures {
        warn!(
            kind = %failure.kind,
            window = %failure.window,
            attempts = failure.attempts,
            reason = %failure.reason,
            "Window not fully searched"
        );
    }
    for credential in &summary.credentials {
        info!(
            credential = %credential.masked,
            state = ?credential.state,
            remaining = credential.remaining,
            limit = credential.limit,
            requests = credential.requests,
            "Credential final state"
        );
    }
    if summary.cancelled {
        warn!(
            pending_windows = summary.windows_pending,
            "Search interrupted - results so far were saved"
        );
    }
    info!(
        items = summary.items_discovered,
        windows_completed = summary.windows_completed,
        windows_split = summary.windows_split,
        windows_failed = summary.windows_failed,
        requests = summary.requests,
        elapsed_secs = summary.elapsed.as_secs(),
        complete = summary.is_complete(),
        "Search summary"
    );
}

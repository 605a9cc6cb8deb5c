//! # Slicehound
//!
//! Discovers every item matching a query against a search API that caps each
//! query at 1000 visible matches and meters requests with a per-minute quota.
//!
//! ## Features
//!
//! - **Adaptive time slicing**: date ranges are bisected until every sub-query
//!   stays under the result cap
//! - **Credential rotation**: round-robin over a pool of tokens with proactive
//!   low-quota rotation and pool-wide reset waits
//! - **Rate governance**: `Retry-After` honoured exactly, exponential backoff
//!   with jitter otherwise, forced cooldown on abuse detection
//! - **Live output**: items are deduplicated and appended to the sink as each
//!   page arrives
//! - **Graceful shutdown**: Ctrl+C is honoured between windows and the sink is
//!   always finalized
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use slicehound::auth::CredentialPool;
//! use slicehound::engine::{EngineConfig, Orchestrator, ResultStore};
//! use slicehound::fetcher::github_http::GitHubClient;
//! use slicehound::{SearchKind, SearchWindow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let provider = GitHubClient::new(&config)?;
//! let pool = CredentialPool::new(vec!["ghp_example".to_string()], &config)?;
//! let window = SearchWindow::new(
//!     NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
//! )?;
//!
//! let mut orchestrator = Orchestrator::new(provider, pool, ResultStore::in_memory(), config)?;
//! let summary = orchestrator
//!     .run("example.com", &[SearchKind::Repository], window)
//!     .await?;
//! println!("{} items", summary.items_discovered);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`auth`] - Credentials, the credential pool, and the credential source
//! - [`engine`] - Partitioner, rate governor, executor, result store, orchestrator
//! - [`fetcher`] - Search provider abstraction and the GitHub implementation
//! - [`output`] - Result sinks (CSV, JSON lines, URL list, HTML)
//! - [`cli`] - Command-line front-end

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Credentials and credential pool
pub mod auth;

/// CLI command implementations
pub mod cli;

/// Search engine: partitioning, rate governance, execution, orchestration
pub mod engine;

/// Search providers
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Result sinks
pub mod output;

/// Cooperative stop signal shared across the run
pub mod shutdown;

/// Kind of artifact a search discovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Repository metadata search
    Repository,
    /// Gist search
    Gist,
    /// Code search
    Code,
}

impl SearchKind {
    /// All kinds, in the order a default run searches them.
    pub const ALL: [SearchKind; 3] = [SearchKind::Repository, SearchKind::Code, SearchKind::Gist];

    /// Stable lowercase label used in logs, metrics and output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Gist => "gist",
            Self::Code => "code",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "repository" | "repositories" | "repo" | "repos" => Ok(Self::Repository),
            "gist" | "gists" => Ok(Self::Gist),
            "code" => Ok(Self::Code),
            _ => Err(format!(
                "Invalid search kind: {s}. Valid options: repository, gist, code"
            )),
        }
    }
}

/// Identity of a discovered artifact, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    /// Artifact kind
    pub kind: SearchKind,
    /// Provider-assigned identifier, unique within `kind`
    pub provider_id: String,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.provider_id)
    }
}

/// One discovered artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    /// Artifact kind
    pub kind: SearchKind,
    /// Provider-assigned identifier
    pub provider_id: String,
    /// Browser-viewable URL
    pub url: String,
    /// Display name (repository full name, file path, gist id)
    pub name: String,
    /// Owner login, when known
    pub owner: Option<String>,
    /// Provider fields not lifted into the struct
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SearchItem {
    /// Deduplication key `(kind, provider_id)`.
    pub fn key(&self) -> ItemKey {
        ItemKey {
            kind: self.kind,
            provider_id: self.provider_id.clone(),
        }
    }
}

/// Errors building a [`SearchWindow`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// Start date after end date
    #[error("window start {start} is after end {end}")]
    Inverted {
        /// Requested start
        start: NaiveDate,
        /// Requested end
        end: NaiveDate,
    },
}

/// Closed date interval `[start, end]` used as a query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl SearchWindow {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Window covering whole calendar years `[Jan 1 of start_year, Dec 31 of end_year]`.
    pub fn years(start_year: i32, end_year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(end_year, 12, 31)?;
        Self::new(start, end).ok()
    }

    /// First day (inclusive).
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day (inclusive).
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, at least 1.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether the window spans exactly one day and cannot be split.
    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for SearchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

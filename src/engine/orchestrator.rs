//! Run loop: pending windows in, items and a summary out

use crate::auth::{CredentialError, CredentialPool, CredentialReport};
use crate::engine::config::EngineConfig;
use crate::engine::executor::{ExecutionContext, ExecutorError, ExecutorOutcome, SearchExecutor};
use crate::engine::partition::{WindowArena, WindowId, WindowStatus};
use crate::engine::rate_limit::RateGovernor;
use crate::engine::store::ResultStore;
use crate::engine::EngineError;
use crate::fetcher::SearchProvider;
use crate::shutdown::{sleep_or_shutdown, SharedShutdown, Sleep};
use crate::{SearchKind, SearchWindow};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Why a completed window may be missing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// A single day alone exceeds the result cap
    DayOverCap,
    /// The provider served fewer items than it reported
    Shortfall,
}

/// A completed window whose results are known to be incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletenessWarning {
    /// Search kind
    pub kind: SearchKind,
    /// Date range; always a single day for [`IncompleteReason::DayOverCap`]
    pub window: SearchWindow,
    /// What went missing
    pub reason: IncompleteReason,
    /// Total the provider reported
    pub total_count: u64,
    /// Items actually retrieved
    pub fetched: u64,
}

/// A window retired without complete results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWindow {
    /// Search kind
    pub kind: SearchKind,
    /// Date range
    pub window: SearchWindow,
    /// Attempts made
    pub attempts: u32,
    /// Last error
    pub reason: String,
}

/// A completed leaf of the partition tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafWindow {
    /// Search kind
    pub kind: SearchKind,
    /// Date range
    pub window: SearchWindow,
    /// Total the provider reported
    pub total_count: u64,
    /// Items retrieved
    pub fetched: u64,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Distinct items in the store
    pub items_discovered: usize,
    /// Distinct items per kind
    pub items_by_kind: BTreeMap<SearchKind, usize>,
    /// Duplicate items ignored
    pub duplicates: u64,
    /// Windows fully retrieved
    pub windows_completed: usize,
    /// Windows split into halves
    pub windows_split: usize,
    /// Windows retired as failed
    pub windows_failed: usize,
    /// Windows never processed because the run stopped early
    pub windows_pending: usize,
    /// Completed windows in completion order
    pub leaves: Vec<LeafWindow>,
    /// Truncated single days and short windows
    pub warnings: Vec<CompletenessWarning>,
    /// Failed windows
    pub failures: Vec<FailedWindow>,
    /// A stop request ended the run
    pub cancelled: bool,
    /// Requests that received a response
    pub requests: u64,
    /// Final credential states
    pub credentials: Vec<CredentialReport>,
    /// Wall-clock duration
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether every window was retrieved in full.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.windows_failed == 0 && self.warnings.is_empty()
    }
}

/// Drives windows through the executor until none remain.
pub struct Orchestrator<P: SearchProvider> {
    provider: P,
    pool: CredentialPool,
    store: ResultStore,
    governor: RateGovernor,
    config: EngineConfig,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl<P: SearchProvider> Orchestrator<P> {
    /// Create an orchestrator; validates `config`.
    pub fn new(
        provider: P,
        pool: CredentialPool,
        store: ResultStore,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if pool.is_empty() {
            return Err(EngineError::NoCredentials);
        }
        let governor = RateGovernor::new(&config);
        Ok(Self {
            provider,
            pool,
            store,
            governor,
            config,
            shutdown: None,
            progress: None,
        })
    }

    /// Honour `shutdown` between windows and during waits.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Report progress on `bar` as windows complete.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Search backend.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Items recorded so far.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Credential pool.
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Search `term` for each of `kinds` across `window`.
    ///
    /// Kinds are searched in the order given, each starting from one root
    /// window. The sink is finalized on every exit path. Returns
    /// [`EngineError::CredentialsExhausted`] when every credential has been
    /// rejected; any other window failure is recorded in the summary.
    pub async fn run(
        &mut self,
        term: &str,
        kinds: &[SearchKind],
        window: SearchWindow,
    ) -> Result<RunSummary, EngineError> {
        if kinds.is_empty() {
            return Err(EngineError::NoKinds);
        }

        let started = Instant::now();
        let mut arena = WindowArena::new();
        for &kind in kinds {
            arena.push_root(window, kind);
        }

        info!(
            term = %term,
            window = %window,
            kinds = ?kinds,
            credentials = self.pool.len(),
            "Starting search run"
        );

        let mut summary = RunSummary::default();
        let fatal = self.drive(term, &mut arena, &mut summary).await;

        let finalized = self.store.finalize();
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        summary.items_discovered = self.store.len();
        summary.items_by_kind = self.store.count_by_kind();
        summary.duplicates = self.store.duplicates();
        summary.windows_pending = arena.pending();
        summary.credentials = self.pool.report();
        summary.requests = summary.credentials.iter().map(|c| c.requests).sum();
        summary.elapsed = started.elapsed();

        if let Some(e) = fatal {
            error!(error = %e, items = summary.items_discovered, "Search run aborted");
            return Err(e);
        }
        finalized?;

        info!(
            items = summary.items_discovered,
            windows_completed = summary.windows_completed,
            windows_split = summary.windows_split,
            windows_failed = summary.windows_failed,
            warnings = summary.warnings.len(),
            cancelled = summary.cancelled,
            elapsed_secs = summary.elapsed.as_secs(),
            "Search run finished"
        );
        Ok(summary)
    }

    /// Main loop. Returns the fatal error that stopped it, if any.
    async fn drive(
        &mut self,
        term: &str,
        arena: &mut WindowArena,
        summary: &mut RunSummary,
    ) -> Option<EngineError> {
        let shutdown = self.shutdown.clone();
        let shutdown = shutdown.as_deref();
        let executor = SearchExecutor::new(&self.provider, &self.config, shutdown);

        while let Some(id) = arena.pop() {
            if shutdown.is_some_and(|s| s.is_shutdown_requested()) {
                info!("Shutdown requested - stopping before next window");
                arena.retry_now(id);
                summary.cancelled = true;
                return None;
            }

            let node = arena.node(id).clone();
            let credential = match self.pool.acquire(&self.governor, shutdown).await {
                Ok(credential) => credential,
                Err(CredentialError::Cancelled) => {
                    arena.retry_now(id);
                    summary.cancelled = true;
                    return None;
                }
                Err(e) => {
                    arena.retry_now(id);
                    return Some(EngineError::CredentialsExhausted(e));
                }
            };

            let mut ctx = ExecutionContext {
                pool: &mut self.pool,
                governor: &mut self.governor,
                store: &mut self.store,
            };
            let outcome = executor
                .execute(&mut ctx, term, node.kind, node.window, credential)
                .await;

            match outcome {
                ExecutorOutcome::Complete(report) => {
                    crate::metrics::record_window_completed(node.kind, report.truncated);
                    summary.windows_completed += 1;
                    summary.leaves.push(LeafWindow {
                        kind: node.kind,
                        window: node.window,
                        total_count: report.total_count,
                        fetched: report.fetched,
                    });
                    let reason = if report.truncated {
                        Some(IncompleteReason::DayOverCap)
                    } else if report.shortfall {
                        Some(IncompleteReason::Shortfall)
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        summary.warnings.push(CompletenessWarning {
                            kind: node.kind,
                            window: node.window,
                            reason,
                            total_count: report.total_count,
                            fetched: report.fetched,
                        });
                    }
                    if report.truncated {
                        arena.retire(id, WindowStatus::Truncated);
                    } else {
                        arena.retire(id, WindowStatus::Complete);
                    }
                }
                ExecutorOutcome::NeedsSplit { total_count } => match arena.split(id) {
                    Some((left, right)) => {
                        crate::metrics::record_split(node.kind);
                        summary.windows_split += 1;
                        info!(
                            kind = %node.kind,
                            window = %node.window,
                            total_count,
                            left = %arena.node(left).window,
                            right = %arena.node(right).window,
                            "Window over result cap - splitting"
                        );
                    }
                    None => {
                        let reason = format!("cannot split single day with {total_count} matches");
                        self.fail_window(arena, id, reason, summary);
                    }
                },
                ExecutorOutcome::Failed(ExecutorError::Credentials(CredentialError::Cancelled))
                | ExecutorOutcome::Failed(ExecutorError::Cancelled) => {
                    arena.retry_now(id);
                    summary.cancelled = true;
                    return None;
                }
                ExecutorOutcome::Failed(ExecutorError::Credentials(e)) => {
                    arena.retry_now(id);
                    return Some(EngineError::CredentialsExhausted(e));
                }
                ExecutorOutcome::Failed(ExecutorError::Output(e)) => {
                    return Some(EngineError::Output(e));
                }
                ExecutorOutcome::Failed(ExecutorError::Unauthorized(credential)) => {
                    warn!(
                        kind = %node.kind,
                        window = %node.window,
                        credential = %credential,
                        "Credential rejected mid-window - retrying with another credential"
                    );
                    arena.retry_now(id);
                }
                ExecutorOutcome::Failed(e) if e.is_transient() => {
                    if node.attempts >= self.config.max_retries {
                        self.fail_window(arena, id, e.to_string(), summary);
                    } else {
                        let wait = self.governor.transient_backoff(node.attempts);
                        warn!(
                            kind = %node.kind,
                            window = %node.window,
                            attempt = node.attempts + 1,
                            max_retries = self.config.max_retries,
                            backoff_ms = wait.as_millis(),
                            error = %e,
                            "Transient failure - re-enqueueing window"
                        );
                        arena.requeue(id);
                        if sleep_or_shutdown(wait, shutdown).await == Sleep::Interrupted {
                            summary.cancelled = true;
                            return None;
                        }
                    }
                }
                ExecutorOutcome::Failed(e) => {
                    error!(kind = %node.kind, window = %node.window, error = %e, "Window failed");
                    self.fail_window(arena, id, e.to_string(), summary);
                }
            }

            if let Some(bar) = &self.progress {
                bar.set_message(format!(
                    "{} items | {} windows done | {} queued",
                    self.store.len(),
                    summary.windows_completed,
                    arena.pending()
                ));
                bar.tick();
            }
        }
        None
    }

    fn fail_window(
        &self,
        arena: &mut WindowArena,
        id: WindowId,
        reason: String,
        summary: &mut RunSummary,
    ) {
        let node = arena.node(id);
        crate::metrics::record_window_failed(node.kind);
        summary.windows_failed += 1;
        summary.failures.push(FailedWindow {
            kind: node.kind,
            window: node.window,
            attempts: node.attempts,
            reason: reason.clone(),
        });
        warn!(kind = %node.kind, window = %node.window, reason = %reason, "Window retired as partially failed");
        arena.retire(id, WindowStatus::Failed(reason));
    }
}

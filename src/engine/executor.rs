//! Paginated retrieval of one window
//!
//! The executor issues the first page, decides from its `total_count`
//! whether the window must be split, and otherwise pages sequentially until
//! a short page or the visible cap. Every page's items go into the
//! [`ResultStore`] as soon as the page arrives, and every response passes
//! through the [`CredentialPool`] and [`RateGovernor`] before the next
//! request is issued.
//!
//! A provider that reports no total (gist HTML without a results banner) is
//! paged until a short or empty page. If such a window fills the cap it is
//! split like any other over-cap window.
//!
//! A stop request is honoured between pages as well as between windows. The
//! interrupted window goes back on the queue and its stored items are
//! deduplicated when it is fetched again.

use crate::auth::{CredentialError, CredentialId, CredentialPool};
use crate::engine::config::EngineConfig;
use crate::engine::rate_limit::{PostResponseDecision, PreRequestDecision, RateGovernor};
use crate::engine::store::ResultStore;
use crate::fetcher::query::build_query;
use crate::fetcher::{FetcherError, ResponseClass, SearchProvider, SearchRequest};
use crate::metrics::RequestMetrics;
use crate::output::OutputError;
use crate::shutdown::{sleep_or_shutdown, ShutdownCoordinator, Sleep};
use crate::{SearchKind, SearchWindow};
use tracing::{debug, info, warn};

/// Result of executing one window.
#[derive(Debug)]
pub enum ExecutorOutcome {
    /// Every visible match was fetched and recorded
    Complete(WindowReport),
    /// The window reports more matches than the provider exposes
    NeedsSplit {
        /// Reported total
        total_count: u64,
    },
    /// Retrieval stopped early
    Failed(ExecutorError),
}

/// Counts for a completed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowReport {
    /// Total the provider reported on the first page
    pub total_count: u64,
    /// Items received across all pages, duplicates included
    pub fetched: u64,
    /// Items not previously in the store
    pub new_items: u64,
    /// A single day over the cap: only the visible matches were retrieved
    pub truncated: bool,
    /// Fewer items arrived than the provider reported, without hitting the cap
    pub shortfall: bool,
    /// The provider flagged at least one page as incomplete
    pub incomplete: bool,
}

/// Why a window could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The provider rejected the credential; it has been marked invalid
    #[error("credential {0} rejected by provider")]
    Unauthorized(CredentialId),

    /// The provider rejected the query
    #[error("query rejected: {0}")]
    InvalidQuery(String),

    /// 5xx from the provider
    #[error("provider error {status}: {message}")]
    Provider {
        /// HTTP status
        status: u16,
        /// Body message
        message: String,
    },

    /// Other 4xx from the provider
    #[error("request rejected {status}: {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Body message
        message: String,
    },

    /// No usable response
    #[error(transparent)]
    Fetch(#[from] FetcherError),

    /// A page kept drawing penalties
    #[error("page {page} penalized {retries} times in a row")]
    PenaltyRetriesExceeded {
        /// Page number
        page: u32,
        /// Consecutive penalties
        retries: u32,
    },

    /// No credential could be acquired
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// The sink failed while recording items
    #[error(transparent)]
    Output(#[from] OutputError),

    /// A stop was requested mid-window
    #[error("cancelled")]
    Cancelled,
}

impl ExecutorError {
    /// Whether re-running the window later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unauthorized(_) | Self::Provider { .. } | Self::PenaltyRetriesExceeded { .. } => {
                true
            }
            Self::Fetch(e) => e.is_transient(),
            Self::InvalidQuery(_)
            | Self::Rejected { .. }
            | Self::Credentials(_)
            | Self::Output(_)
            | Self::Cancelled => false,
        }
    }
}

/// Mutable run state a window execution works against.
pub struct ExecutionContext<'a> {
    /// Credential pool
    pub pool: &'a mut CredentialPool,
    /// Rate governor
    pub governor: &'a mut RateGovernor,
    /// Item store
    pub store: &'a mut ResultStore,
}

/// Executes windows against one provider.
pub struct SearchExecutor<'a, P: SearchProvider + ?Sized> {
    provider: &'a P,
    config: &'a EngineConfig,
    shutdown: Option<&'a ShutdownCoordinator>,
}

impl<'a, P: SearchProvider + ?Sized> SearchExecutor<'a, P> {
    /// Create an executor.
    pub fn new(
        provider: &'a P,
        config: &'a EngineConfig,
        shutdown: Option<&'a ShutdownCoordinator>,
    ) -> Self {
        Self {
            provider,
            config,
            shutdown,
        }
    }

    /// Page size used for `kind`.
    pub fn page_size(&self, kind: SearchKind) -> u32 {
        self.config
            .effective_page_size()
            .min(self.provider.max_page_size(kind))
            .max(1)
    }

    /// Retrieve every visible match of `term` of `kind` within `window`.
    ///
    /// `credential` must have been cleared by [`CredentialPool::acquire`].
    /// Returns [`ExecutorOutcome::NeedsSplit`] right after the first page when
    /// a multi-day window reports more matches than the result cap.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext<'_>,
        term: &str,
        kind: SearchKind,
        window: SearchWindow,
        credential: CredentialId,
    ) -> ExecutorOutcome {
        match self.run_pages(ctx, term, kind, window, credential).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutorOutcome::Failed(e),
        }
    }

    async fn run_pages(
        &self,
        ctx: &mut ExecutionContext<'_>,
        term: &str,
        kind: SearchKind,
        window: SearchWindow,
        mut credential: CredentialId,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        let query = build_query(term, &window);
        let per_page = self.page_size(kind);
        let cap = self.config.result_cap;

        let mut page: u32 = 1;
        let mut penalties: u32 = 0;
        let mut open_ended = false;
        let mut report = WindowReport::default();

        debug!(%kind, %window, query = %query, "Executing window");

        loop {
            let request = SearchRequest {
                kind,
                query: query.clone(),
                page,
                per_page,
            };

            let request_metrics = RequestMetrics::start(kind, page);
            let secret = ctx.pool.credential(credential).secret().to_string();
            let result = match self.provider.search(&request, &secret).await {
                Ok(result) => {
                    request_metrics.record_complete(result.http_status);
                    result
                }
                Err(e) => {
                    request_metrics.record_network_error();
                    return Err(e.into());
                }
            };

            ctx.pool.release(credential, result.quota());
            let decision = ctx
                .governor
                .after_response(ctx.pool.credential_mut(credential), &result);
            self.pause(ctx.governor).await;

            match result.class() {
                ResponseClass::Success => penalties = 0,
                ResponseClass::RateLimited | ResponseClass::AbuseDetected => {
                    penalties += 1;
                    if penalties > self.config.max_penalty_retries {
                        return Err(ExecutorError::PenaltyRetriesExceeded {
                            page,
                            retries: penalties,
                        });
                    }
                    if let PostResponseDecision::RotateAndBackoff(wait) = decision {
                        crate::metrics::record_wait("abuse", wait);
                        if sleep_or_shutdown(wait, self.shutdown).await == Sleep::Interrupted {
                            return Err(ExecutorError::Cancelled);
                        }
                    }
                    credential = ctx.pool.acquire(ctx.governor, self.shutdown).await?;
                    debug!(%kind, %window, page, credential = %credential, "Retrying page after penalty");
                    continue;
                }
                ResponseClass::Unauthorized => {
                    ctx.pool.mark_invalid(credential);
                    return Err(ExecutorError::Unauthorized(credential));
                }
                ResponseClass::InvalidQuery => {
                    return Err(ExecutorError::InvalidQuery(
                        result.message.unwrap_or_else(|| query.clone()),
                    ));
                }
                ResponseClass::ServerError(status) => {
                    return Err(ExecutorError::Provider {
                        status,
                        message: result.message.unwrap_or_default(),
                    });
                }
                ResponseClass::ClientError(status) => {
                    return Err(ExecutorError::Rejected {
                        status,
                        message: result.message.unwrap_or_default(),
                    });
                }
            }

            if page == 1 {
                report.total_count = result.total_count;
                open_ended = result.total_estimated;
                if !open_ended && result.total_count > cap && !window.is_single_day() {
                    debug!(%kind, %window, total_count = result.total_count, "Window over result cap");
                    return Ok(ExecutorOutcome::NeedsSplit {
                        total_count: result.total_count,
                    });
                }
            }
            if result.incomplete_results {
                report.incomplete = true;
            }

            let page_len = result.items.len() as u64;
            let mut new_items = 0;
            for item in result.items {
                if ctx.store.insert(item)? {
                    new_items += 1;
                }
            }
            report.fetched += page_len;
            report.new_items += new_items;
            crate::metrics::record_items(kind, new_items);

            let target = if open_ended {
                cap
            } else {
                report.total_count.min(cap)
            };
            let next_offset = u64::from(page) * u64::from(per_page);
            let full_page = page_len >= u64::from(per_page);
            if !full_page || report.fetched >= target || next_offset >= cap {
                if open_ended {
                    report.total_count = report.fetched;
                    if full_page && next_offset >= cap && !window.is_single_day() {
                        debug!(
                            %kind,
                            %window,
                            fetched = report.fetched,
                            "Window without a total filled the result cap"
                        );
                        return Ok(ExecutorOutcome::NeedsSplit {
                            total_count: report.fetched,
                        });
                    }
                }
                break;
            }

            if self
                .shutdown
                .is_some_and(ShutdownCoordinator::is_shutdown_requested)
            {
                return Err(ExecutorError::Cancelled);
            }

            page += 1;
            if ctx.governor.before_request(ctx.pool.credential(credential))
                != PreRequestDecision::Proceed
            {
                credential = ctx.pool.acquire(ctx.governor, self.shutdown).await?;
            }
        }

        report.truncated = window.is_single_day() && report.total_count >= cap;
        report.shortfall = !report.truncated && report.fetched < report.total_count;

        if report.truncated {
            warn!(
                %kind,
                date = %window,
                total_count = report.total_count,
                fetched = report.fetched,
                "Single day exceeds the result cap - results for this day are incomplete"
            );
        } else if report.shortfall {
            warn!(
                %kind,
                %window,
                total_count = report.total_count,
                fetched = report.fetched,
                "Provider returned fewer items than it reported"
            );
        } else {
            info!(
                %kind,
                %window,
                total_count = report.total_count,
                new_items = report.new_items,
                "Window complete"
            );
        }

        Ok(ExecutorOutcome::Complete(report))
    }

    /// Inter-request delay. A stop request cuts it short; the caller checks
    /// the stop flag before the next page.
    async fn pause(&self, governor: &mut RateGovernor) {
        let delay = self.config.delay.sample(governor.rng());
        if !delay.is_zero() {
            sleep_or_shutdown(delay, self.shutdown).await;
        }
    }
}

//! Credential pool: round-robin selection, quota bookkeeping, exhaustion waits
//!
//! # Shared quota caveat
//!
//! The provider meters search requests per authenticated principal, not per
//! token. Several tokens minted by one account therefore drain one shared
//! bucket even though this pool tracks each token as an independent bucket.
//! Rotation still helps with tokens from distinct accounts; with tokens from a
//! single account the pool's per-token `remaining` is optimistic and the
//! provider's 429 answers become the effective limiter.

use super::credential::{Credential, CredentialId, CredentialState, QuotaSnapshot};
use crate::engine::config::EngineConfig;
use crate::engine::rate_limit::{chrono_duration, PreRequestDecision, RateGovernor};
use crate::shutdown::{sleep_or_shutdown, ShutdownCoordinator, Sleep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Quota window assumed when the provider has not reported a reset time.
const FALLBACK_QUOTA_WINDOW: Duration = Duration::from_secs(60);

/// Credential pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The credential source produced no secrets
    #[error("no credentials supplied")]
    NoCredentials,

    /// Every credential was rejected by the provider
    #[error("all {0} credential(s) are invalid")]
    AllInvalid(usize),

    /// A stop was requested while waiting for a credential
    #[error("cancelled while waiting for a credential")]
    Cancelled,

    /// The credential source could not be read
    #[error("failed to read credentials from {path}: {message}")]
    Source {
        /// File or directory
        path: String,
        /// Underlying error
        message: String,
    },
}

/// Final state of one credential, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialReport {
    /// Masked secret
    pub masked: String,
    /// Lifecycle state at report time
    pub state: CredentialState,
    /// Last observed remaining quota
    pub remaining: u32,
    /// Last observed quota limit
    pub limit: u32,
    /// Requests issued
    pub requests: u64,
}

/// All credentials of a run.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: usize,
    low_quota_threshold: u32,
    max_reset_wait: Duration,
}

impl CredentialPool {
    /// Build a pool from secrets in source order.
    pub fn new(secrets: Vec<String>, config: &EngineConfig) -> Result<Self, CredentialError> {
        if secrets.is_empty() {
            return Err(CredentialError::NoCredentials);
        }
        let credentials = secrets
            .into_iter()
            .enumerate()
            .map(|(index, secret)| {
                Credential::new(CredentialId(index), secret, config.default_quota_limit)
            })
            .collect();

        Ok(Self {
            credentials,
            cursor: 0,
            low_quota_threshold: config.low_quota_threshold,
            max_reset_wait: config.max_reset_wait(),
        })
    }

    /// Number of credentials, including invalid ones.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the pool holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Ids in load order.
    pub fn ids(&self) -> impl Iterator<Item = CredentialId> + '_ {
        self.credentials.iter().map(Credential::id)
    }

    /// Look up a credential.
    pub fn credential(&self, id: CredentialId) -> &Credential {
        &self.credentials[id.0]
    }

    /// Look up a credential for mutation.
    pub fn credential_mut(&mut self, id: CredentialId) -> &mut Credential {
        &mut self.credentials[id.0]
    }

    /// Credentials currently eligible for selection.
    pub fn active_count(&self) -> usize {
        self.credentials.iter().filter(|c| c.is_active()).count()
    }

    /// Credentials not permanently invalid.
    pub fn usable_count(&self) -> usize {
        self.credentials
            .iter()
            .filter(|c| c.state() != CredentialState::Invalid)
            .count()
    }

    /// Select the next usable credential, waiting if every one is cooling.
    ///
    /// Round-robin over `Active` credentials, skipping any the governor
    /// rejects. A skipped low-quota credential is moved to `RateLimited`
    /// until its reset. When nothing is usable the pool sleeps until the
    /// soonest credential recovers (bounded by `max_reset_wait_secs`) and
    /// re-promotes it. Never returns an `Invalid` or `Exhausted` credential.
    pub async fn acquire(
        &mut self,
        governor: &RateGovernor,
        shutdown: Option<&ShutdownCoordinator>,
    ) -> Result<CredentialId, CredentialError> {
        loop {
            if self.usable_count() == 0 {
                return Err(CredentialError::AllInvalid(self.credentials.len()));
            }

            let now = Utc::now();
            self.refresh(now);

            let count = self.credentials.len();
            for offset in 0..count {
                let index = (self.cursor + offset) % count;
                let credential = &mut self.credentials[index];
                if credential.state() == CredentialState::Invalid {
                    continue;
                }
                match governor.before_request(credential) {
                    PreRequestDecision::Proceed => {
                        self.cursor = (index + 1) % count;
                        crate::metrics::record_active_credentials(self.active_count());
                        return Ok(CredentialId(index));
                    }
                    PreRequestDecision::Rotate => {
                        if credential.is_active() {
                            debug!(
                                credential = %credential.masked(),
                                remaining = credential.remaining(),
                                "Low quota - rotating to next credential"
                            );
                            let until = recovery_time(credential, now);
                            credential.cool_down(until);
                        }
                    }
                    PreRequestDecision::Wait(_) => {}
                }
            }

            self.wait_for_soonest(now, shutdown).await?;
        }
    }

    /// Record the quota snapshot observed on a response.
    ///
    /// A credential whose remaining quota falls below the low-quota threshold
    /// is moved to `RateLimited` before the provider starts rejecting it.
    pub fn release(&mut self, id: CredentialId, observed: QuotaSnapshot) {
        let threshold = self.low_quota_threshold;
        let credential = &mut self.credentials[id.0];
        credential.observe(&observed);
        credential.requests += 1;

        if credential.is_active() && credential.remaining() < threshold {
            let until = recovery_time(credential, Utc::now());
            debug!(
                credential = %credential.masked(),
                remaining = credential.remaining(),
                resume_at = %until,
                "Quota below threshold - parking credential until reset"
            );
            credential.cool_down(until);
        }
    }

    /// Permanently remove a credential from rotation after an authentication failure.
    pub fn mark_invalid(&mut self, id: CredentialId) {
        let credential = &mut self.credentials[id.0];
        if credential.state() != CredentialState::Invalid {
            warn!(credential = %credential.masked(), "Credential rejected by provider - marking invalid");
            credential.invalidate();
        }
        crate::metrics::record_active_credentials(self.active_count());
    }

    /// Snapshot of every credential for the run summary.
    pub fn report(&self) -> Vec<CredentialReport> {
        self.credentials
            .iter()
            .map(|c| CredentialReport {
                masked: c.masked(),
                state: c.state(),
                remaining: c.remaining(),
                limit: c.limit(),
                requests: c.requests(),
            })
            .collect()
    }

    /// Promote cooling credentials whose wait has elapsed.
    fn refresh(&mut self, now: DateTime<Utc>) {
        for credential in &mut self.credentials {
            if credential.state().is_cooling()
                && credential.resume_at().map_or(true, |resume_at| resume_at <= now)
            {
                debug!(credential = %credential.masked(), "Credential cooldown elapsed - reactivating");
                credential.reactivate(now);
            }
        }
    }

    /// Every usable credential is cooling: sleep until the soonest recovers.
    async fn wait_for_soonest(
        &mut self,
        now: DateTime<Utc>,
        shutdown: Option<&ShutdownCoordinator>,
    ) -> Result<(), CredentialError> {
        let soonest = self
            .credentials
            .iter()
            .filter(|c| c.state().is_cooling())
            .min_by_key(|c| c.resume_at().unwrap_or(now))
            .map(|c| (c.id(), c.resume_at().unwrap_or(now)));

        let Some((soonest_id, resume_at)) = soonest else {
            return Ok(());
        };

        for credential in &mut self.credentials {
            if credential.state() == CredentialState::RateLimited {
                credential.state = CredentialState::Exhausted;
            }
        }

        let wait = (resume_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(self.max_reset_wait);

        if !wait.is_zero() {
            warn!(
                wait_secs = wait.as_secs(),
                credentials = self.usable_count(),
                "All credentials rate limited - waiting for the soonest reset"
            );
            crate::metrics::record_wait("exhausted", wait);
        }

        let outcome = sleep_or_shutdown(wait, shutdown).await;

        for credential in &mut self.credentials {
            if credential.state() == CredentialState::Exhausted && credential.id() != soonest_id {
                credential.state = CredentialState::RateLimited;
            }
        }

        if outcome == Sleep::Interrupted {
            let credential = &mut self.credentials[soonest_id.0];
            credential.state = CredentialState::RateLimited;
            return Err(CredentialError::Cancelled);
        }

        let credential = &mut self.credentials[soonest_id.0];
        credential.reactivate(Utc::now());
        info!(credential = %credential.masked(), "Credential re-promoted after reset wait");
        Ok(())
    }
}

/// When a low-quota credential may be used again.
fn recovery_time(credential: &Credential, now: DateTime<Utc>) -> DateTime<Utc> {
    if credential.reset_at() > now {
        credential.reset_at()
    } else {
        now + chrono_duration(FALLBACK_QUOTA_WINDOW)
    }
}

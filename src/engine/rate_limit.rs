//! Rate governance: proceed / wait / rotate decisions and penalty backoff
//!
//! The governor never sleeps itself. It inspects a credential before a
//! request and a response after it, updates the credential's penalty state,
//! and tells the caller what to do. Waiting is done by the pool (cooldowns)
//! and the executor (abuse cooldowns, inter-request delay).

use crate::auth::Credential;
use crate::engine::config::{calculate_backoff, EngineConfig};
use crate::fetcher::{RequestResult, ResponseClass};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, warn};

/// Decision taken before issuing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreRequestDecision {
    /// Use the credential now
    Proceed,
    /// The credential becomes usable after this long
    Wait(Duration),
    /// Skip the credential this cycle
    Rotate,
}

/// Decision taken after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostResponseDecision {
    /// Continue with the next request
    Proceed,
    /// The credential is cooling for this long; retry once it (or another) is ready
    Backoff(Duration),
    /// Sleep this long, then continue on a different credential
    RotateAndBackoff(Duration),
}

/// Decides when credentials may be used and how long penalties last.
#[derive(Debug)]
pub struct RateGovernor {
    low_quota_threshold: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter_ratio: f64,
    abuse_cooldown: Duration,
    rng: StdRng,
}

impl RateGovernor {
    /// Create a governor from engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            low_quota_threshold: config.low_quota_threshold,
            base_backoff: config.base_backoff(),
            max_backoff: config.max_backoff(),
            jitter_ratio: config.jitter_ratio,
            abuse_cooldown: config.abuse_cooldown(),
            rng,
        }
    }

    /// Remaining-quota floor below which a credential is skipped.
    pub fn low_quota_threshold(&self) -> u32 {
        self.low_quota_threshold
    }

    /// Decide whether `credential` may issue a request now.
    pub fn before_request(&self, credential: &Credential) -> PreRequestDecision {
        if !credential.is_active() {
            if let Some(resume_at) = credential.resume_at() {
                if let Ok(wait) = (resume_at - Utc::now()).to_std() {
                    if !wait.is_zero() {
                        return PreRequestDecision::Wait(wait);
                    }
                }
            }
            return PreRequestDecision::Rotate;
        }
        if credential.remaining() < self.low_quota_threshold {
            return PreRequestDecision::Rotate;
        }
        PreRequestDecision::Proceed
    }

    /// Inspect a response, update the credential's penalty state and decide.
    ///
    /// Quota headers are recorded by the pool (`CredentialPool::release`)
    /// before this is called.
    pub fn after_response(
        &mut self,
        credential: &mut Credential,
        result: &RequestResult,
    ) -> PostResponseDecision {
        match result.class() {
            ResponseClass::Success => {
                if credential.penalties > 0 {
                    debug!(
                        credential = %credential.masked(),
                        penalties = credential.penalties,
                        "Success after penalties - resetting backoff"
                    );
                }
                credential.penalties = 0;
                PostResponseDecision::Proceed
            }
            ResponseClass::AbuseDetected => {
                credential.penalties = credential.penalties.saturating_add(1);
                let wait = result.retry_after.unwrap_or(self.abuse_cooldown);
                credential.cool_down(Utc::now() + chrono_duration(wait));
                crate::metrics::record_penalty("abuse");
                warn!(
                    credential = %credential.masked(),
                    wait_secs = wait.as_secs(),
                    "Abuse detection triggered - cooling down and rotating credential"
                );
                PostResponseDecision::RotateAndBackoff(wait)
            }
            ResponseClass::RateLimited => {
                credential.penalties = credential.penalties.saturating_add(1);
                let wait = match result.retry_after {
                    Some(retry_after) => retry_after,
                    None => self.penalty_backoff(credential.penalties),
                };
                credential.cool_down(Utc::now() + chrono_duration(wait));
                crate::metrics::record_penalty("rate_limit");
                warn!(
                    credential = %credential.masked(),
                    wait_secs = wait.as_secs(),
                    penalties = credential.penalties,
                    retry_after = result.retry_after.is_some(),
                    "Rate limited - backing off"
                );
                PostResponseDecision::Backoff(wait)
            }
            _ => PostResponseDecision::Proceed,
        }
    }

    /// Exponential penalty backoff for the `penalties`-th consecutive penalty.
    ///
    /// `base * 2^(penalties-1)` plus uniform jitter in `[0, base * jitter_ratio]`,
    /// never exceeding the configured cap.
    pub fn penalty_backoff(&mut self, penalties: u32) -> Duration {
        let exponent = penalties.saturating_sub(1).min(31);
        let exponential = self
            .base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff);

        let jitter_ceiling = self.base_backoff.as_secs_f64() * self.jitter_ratio;
        let jitter = if jitter_ceiling > 0.0 {
            Duration::from_secs_f64(self.rng.gen_range(0.0..=jitter_ceiling))
        } else {
            Duration::ZERO
        };

        exponential.saturating_add(jitter).min(self.max_backoff)
    }

    /// Short backoff between retries of a window after a transient failure.
    pub fn transient_backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt)
    }

    /// Mutable access to the sampling RNG, shared with delay sampling.
    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

pub(crate) fn chrono_duration(wait: Duration) -> chrono::Duration {
    chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::days(365))
}

//! A single authentication secret and its observed quota state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Index of a credential inside its [`CredentialPool`](super::CredentialPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CredentialId(pub(crate) usize);

impl CredentialId {
    /// Position in the pool's load order.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a credential.
///
/// `Active` and `RateLimited` alternate as quota is spent and restored.
/// `Exhausted` marks credentials the pool is waiting on while every usable
/// credential is rate limited. `Invalid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// Eligible for selection
    Active,
    /// Cooling down until its quota resets or its penalty elapses
    RateLimited,
    /// Part of a pool-wide exhaustion wait
    Exhausted,
    /// Rejected by the provider; never selected again
    Invalid,
}

impl CredentialState {
    /// Whether the credential is waiting to become usable again.
    pub fn is_cooling(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Exhausted)
    }
}

/// Quota information observed on one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Requests left in the current window
    pub remaining: Option<u32>,
    /// Window size reported by the provider
    pub limit: Option<u32>,
    /// When the current window resets
    pub reset_at: Option<DateTime<Utc>>,
}

/// One authentication secret plus its quota bookkeeping.
#[derive(Clone)]
pub struct Credential {
    id: CredentialId,
    secret: String,
    pub(crate) remaining: u32,
    pub(crate) limit: u32,
    pub(crate) reset_at: DateTime<Utc>,
    pub(crate) state: CredentialState,
    /// Earliest instant the credential may be used again while cooling.
    pub(crate) resume_at: Option<DateTime<Utc>>,
    /// Consecutive penalties without an intervening success.
    pub(crate) penalties: u32,
    pub(crate) requests: u64,
}

impl Credential {
    pub(crate) fn new(id: CredentialId, secret: String, quota_limit: u32) -> Self {
        Self {
            id,
            secret,
            remaining: quota_limit,
            limit: quota_limit,
            reset_at: DateTime::<Utc>::UNIX_EPOCH,
            state: CredentialState::Active,
            resume_at: None,
            penalties: 0,
            requests: 0,
        }
    }

    /// Pool index.
    pub fn id(&self) -> CredentialId {
        self.id
    }

    /// Raw secret, for building the `Authorization` header only.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Secret safe for logs.
    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }

    /// Last observed remaining quota.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Last observed quota window size.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// When the provider said the quota resets.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CredentialState {
        self.state
    }

    /// Earliest time a cooling credential may be used again.
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        self.resume_at
    }

    /// Consecutive penalty count.
    pub fn penalties(&self) -> u32 {
        self.penalties
    }

    /// Requests issued with this credential.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Whether the credential is usable right now.
    pub fn is_active(&self) -> bool {
        self.state == CredentialState::Active
    }

    /// Record a quota snapshot from a response.
    pub fn observe(&mut self, snapshot: &QuotaSnapshot) {
        if let Some(limit) = snapshot.limit {
            self.limit = limit;
        }
        if let Some(remaining) = snapshot.remaining {
            self.remaining = remaining;
        }
        if let Some(reset_at) = snapshot.reset_at {
            self.reset_at = reset_at;
        }
    }

    /// Move to `RateLimited` until `until`.
    pub(crate) fn cool_down(&mut self, until: DateTime<Utc>) {
        if self.state == CredentialState::Invalid {
            return;
        }
        self.state = CredentialState::RateLimited;
        self.resume_at = Some(match self.resume_at {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Return to `Active`, restoring the quota if its reset time has passed.
    pub(crate) fn reactivate(&mut self, now: DateTime<Utc>) {
        if self.state == CredentialState::Invalid {
            return;
        }
        if self.reset_at <= now || self.state == CredentialState::Exhausted {
            self.remaining = self.remaining.max(self.limit);
        }
        self.state = CredentialState::Active;
        self.resume_at = None;
    }

    pub(crate) fn invalidate(&mut self) {
        self.state = CredentialState::Invalid;
        self.resume_at = None;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &self.masked())
            .field("remaining", &self.remaining)
            .field("limit", &self.limit)
            .field("reset_at", &self.reset_at)
            .field("state", &self.state)
            .field("resume_at", &self.resume_at)
            .field("penalties", &self.penalties)
            .finish()
    }
}

/// Mask a secret for display, keeping only the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

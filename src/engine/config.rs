//! Engine configuration, constants and backoff calculation

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Maximum number of matches the provider exposes for one query.
pub const PROVIDER_RESULT_CAP: u64 = 1000;

/// Largest `per_page` the provider accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Rotate away from a credential whose remaining quota drops below this.
pub const LOW_QUOTA_THRESHOLD: u32 = 2;

/// Authenticated search quota per minute, assumed until headers say otherwise.
pub const DEFAULT_QUOTA_LIMIT: u32 = 30;

/// Maximum number of transient-failure retries for one window.
/// Five retries with exponential backoff ride out short outages without
/// looping forever on a persistent failure.
pub const MAX_RETRIES: u32 = 5;

/// Initial transient-failure backoff in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Cap on transient-failure backoff in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Calculate exponential backoff for transient (network/server) failures.
///
/// This is the short schedule used between retries of a window. Quota
/// penalties use the much longer schedule in
/// [`RateGovernor`](crate::engine::RateGovernor).
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {message}")]
    Read {
        /// File path
        path: String,
        /// Underlying error
        message: String,
    },

    /// Config file is not valid TOML for [`EngineConfig`]
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Delay specification could not be parsed
    #[error("invalid delay '{0}': expected seconds (\"2.5\") or a range (\"1.5-3.5\")")]
    InvalidDelay(String),

    /// Values are individually valid but inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Inter-request delay: a fixed pause or a uniformly random one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DelaySpec {
    /// Always pause this many seconds
    Fixed(f64),
    /// Pause a uniformly random duration in `[low, high]` seconds
    Range(f64, f64),
}

impl DelaySpec {
    /// Draw the next delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = match *self {
            Self::Fixed(secs) => secs,
            Self::Range(low, high) if high > low => rng.gen_range(low..=high),
            Self::Range(low, _) => low,
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Upper bound of any delay this setting produces.
    pub fn max(&self) -> Duration {
        let secs = match *self {
            Self::Fixed(secs) => secs,
            Self::Range(_, high) => high,
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for DelaySpec {
    fn default() -> Self {
        Self::Range(2.0, 5.5)
    }
}

impl FromStr for DelaySpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parse = |part: &str| -> Result<f64, ConfigError> {
            let value: f64 = part
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidDelay(s.to_string()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDelay(s.to_string()));
            }
            Ok(value)
        };

        match trimmed.split_once('-') {
            Some((low, high)) => {
                let (low, high) = (parse(low)?, parse(high)?);
                if low > high {
                    return Err(ConfigError::InvalidDelay(s.to_string()));
                }
                Ok(Self::Range(low, high))
            }
            None => Ok(Self::Fixed(parse(trimmed)?)),
        }
    }
}

impl TryFrom<String> for DelaySpec {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DelaySpec> for String {
    fn from(value: DelaySpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DelaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(secs) => write!(f, "{secs}"),
            Self::Range(low, high) => write!(f, "{low}-{high}"),
        }
    }
}

/// Tunables for one search run.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// REST API base URL
    pub api_base: String,
    /// Gist search base URL
    pub gist_base: String,
    /// Provider result cap per query
    pub result_cap: u64,
    /// Results requested per page (clamped to [`MAX_PAGE_SIZE`])
    pub page_size: u32,
    /// Rotate when remaining quota drops below this
    pub low_quota_threshold: u32,
    /// Assumed quota before the provider reports one
    pub default_quota_limit: u32,
    /// First penalty backoff in seconds
    pub base_backoff_secs: u64,
    /// Cap on penalty backoff in seconds
    pub max_backoff_secs: u64,
    /// Jitter upper bound as a fraction of the base backoff
    pub jitter_ratio: f64,
    /// Forced sleep after abuse detection, in seconds
    pub abuse_cooldown_secs: u64,
    /// Transient-failure retries per window
    pub max_retries: u32,
    /// Penalty retries of a single page before the window is re-enqueued
    pub max_penalty_retries: u32,
    /// Upper bound on one pool-wide exhaustion wait, in seconds
    pub max_reset_wait_secs: u64,
    /// Inter-request delay
    pub delay: DelaySpec,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Seed for jitter and delay sampling; random when absent
    pub jitter_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            gist_base: "https://gist.github.com".to_string(),
            result_cap: PROVIDER_RESULT_CAP,
            page_size: MAX_PAGE_SIZE,
            low_quota_threshold: LOW_QUOTA_THRESHOLD,
            default_quota_limit: DEFAULT_QUOTA_LIMIT,
            base_backoff_secs: 60,
            max_backoff_secs: 3600,
            jitter_ratio: 0.1,
            abuse_cooldown_secs: 60,
            max_retries: MAX_RETRIES,
            max_penalty_retries: 8,
            max_reset_wait_secs: 3660,
            delay: DelaySpec::default(),
            request_timeout_secs: 15,
            jitter_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file, filling gaps with defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        if self.result_cap < u64::from(self.effective_page_size()) {
            return Err(ConfigError::Invalid(format!(
                "result_cap {} is smaller than page_size {}",
                self.result_cap, self.page_size
            )));
        }
        if self.default_quota_limit <= self.low_quota_threshold {
            return Err(ConfigError::Invalid(format!(
                "default_quota_limit {} must exceed low_quota_threshold {}",
                self.default_quota_limit, self.low_quota_threshold
            )));
        }
        if self.base_backoff_secs > self.max_backoff_secs {
            return Err(ConfigError::Invalid(format!(
                "base_backoff_secs {} exceeds max_backoff_secs {}",
                self.base_backoff_secs, self.max_backoff_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::Invalid(format!(
                "jitter_ratio {} must be within 0.0..=1.0",
                self.jitter_ratio
            )));
        }
        if let DelaySpec::Range(low, high) = self.delay {
            if low > high {
                return Err(ConfigError::InvalidDelay(self.delay.to_string()));
            }
        }
        Ok(())
    }

    /// Page size actually sent to the provider.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// First penalty backoff.
    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    /// Penalty backoff cap.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Abuse-detection cooldown.
    pub fn abuse_cooldown(&self) -> Duration {
        Duration::from_secs(self.abuse_cooldown_secs)
    }

    /// Bound on a pool-wide exhaustion wait.
    pub fn max_reset_wait(&self) -> Duration {
        Duration::from_secs(self.max_reset_wait_secs)
    }
}

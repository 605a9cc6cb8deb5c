//! Search provider abstraction
//!
//! A [`SearchProvider`] performs one paged query with one credential and
//! normalizes the answer into a [`RequestResult`]. Non-2xx answers are still
//! `Ok`: status codes, quota headers and `Retry-After` are scheduling input for
//! the rate governor. Only failures that produced no usable response at all
//! (network errors, undecodable bodies) are [`FetcherError`]s.

use crate::auth::QuotaSnapshot;
use crate::engine::config::MAX_PAGE_SIZE;
use crate::{SearchItem, SearchKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod github_http;
pub mod github_parser;
pub mod query;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Connection failure, reset, DNS error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    ParseError(String),

    /// Provider cannot serve this kind of search
    #[error("unsupported search: {0}")]
    Unsupported(String),

    /// HTTP client could not be constructed
    #[error("client setup failed: {0}")]
    ClientSetup(String),
}

impl FetcherError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Timeout(_))
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One paged query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// What to search
    pub kind: SearchKind,
    /// Full query string including the date qualifier
    pub query: String,
    /// 1-based page number
    pub page: u32,
    /// Results per page
    pub per_page: u32,
}

/// Normalized response of one paged call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestResult {
    /// HTTP status code
    pub http_status: u16,
    /// Items on this page
    pub items: Vec<SearchItem>,
    /// Total matches the provider reports for the query
    pub total_count: u64,
    /// No total was reported; `total_count` only counts what this page holds
    pub total_estimated: bool,
    /// Provider flagged the result set as incomplete (search timed out server side)
    pub incomplete_results: bool,
    /// `X-RateLimit-Remaining`
    pub rate_remaining: Option<u32>,
    /// `X-RateLimit-Limit`
    pub rate_limit: Option<u32>,
    /// `X-RateLimit-Reset`
    pub rate_reset: Option<DateTime<Utc>>,
    /// `Retry-After`
    pub retry_after: Option<Duration>,
    /// Error message from the body, when the provider sent one
    pub message: Option<String>,
}

impl RequestResult {
    /// Successful page with the given items and total.
    pub fn page(items: Vec<SearchItem>, total_count: u64) -> Self {
        Self {
            http_status: 200,
            items,
            total_count,
            ..Self::default()
        }
    }

    /// Error response with the given status and message.
    pub fn error(http_status: u16, message: impl Into<String>) -> Self {
        Self {
            http_status,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Quota headers as a snapshot for the credential pool.
    pub fn quota(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            remaining: self.rate_remaining,
            limit: self.rate_limit,
            reset_at: self.rate_reset,
        }
    }

    /// Classify the response for scheduling and error handling.
    pub fn class(&self) -> ResponseClass {
        let status = self.http_status;
        if (200..300).contains(&status) {
            return ResponseClass::Success;
        }

        let message = self
            .message
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();

        match status {
            401 => ResponseClass::Unauthorized,
            403 | 429 => {
                if message.contains("abuse") || message.contains("secondary rate limit") {
                    ResponseClass::AbuseDetected
                } else if status == 429
                    || message.contains("rate limit")
                    || self.rate_remaining == Some(0)
                {
                    ResponseClass::RateLimited
                } else {
                    ResponseClass::Unauthorized
                }
            }
            422 => ResponseClass::InvalidQuery,
            500..=599 => ResponseClass::ServerError(status),
            _ => ResponseClass::ClientError(status),
        }
    }
}

/// Classification of a provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx
    Success,
    /// Primary quota exhausted (429, or 403 mentioning the rate limit)
    RateLimited,
    /// Secondary limit / abuse detection
    AbuseDetected,
    /// Credential rejected (401, or 403 without a rate-limit signal)
    Unauthorized,
    /// Query rejected (422)
    InvalidQuery,
    /// 5xx
    ServerError(u16),
    /// Any other 4xx
    ClientError(u16),
}

impl ResponseClass {
    /// Short description for logs.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate limit exceeded",
            Self::AbuseDetected => "abuse detection triggered",
            Self::Unauthorized => "authentication failed",
            Self::InvalidQuery => "query rejected",
            Self::ServerError(code) => match code {
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
        }
    }

    /// Whether the rate governor treats this response as a penalty.
    pub fn is_penalty(&self) -> bool {
        matches!(self, Self::RateLimited | Self::AbuseDetected)
    }
}

/// A search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Execute one paged query with the given secret.
    async fn search(&self, request: &SearchRequest, secret: &str) -> FetcherResult<RequestResult>;

    /// Largest page the provider serves for `kind`.
    fn max_page_size(&self, _kind: SearchKind) -> u32 {
        MAX_PAGE_SIZE
    }

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

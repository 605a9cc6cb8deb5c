//! GitHub search provider
//!
//! Repository and code searches go to the REST search API with a bearer
//! token. Gist search has no REST endpoint and is served from the
//! `gist.github.com/search` HTML page. Rate-limit headers are lifted into
//! every [`RequestResult`], including error responses, so the governor sees
//! quota and `Retry-After` on the exact response that carried them.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::engine::config::EngineConfig;
use crate::fetcher::github_parser::{parse_error_message, parse_gist_page, parse_search_page};
use crate::fetcher::{
    FetcherError, FetcherResult, RequestResult, SearchProvider, SearchRequest,
};
use crate::SearchKind;
use async_trait::async_trait;

/// HTTP connection timeout in seconds
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Gist search pages show this many results
pub const GIST_PAGE_SIZE: u32 = 10;

const USER_AGENT: &str = concat!("slicehound/", env!("CARGO_PKG_VERSION"));
const API_MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Search quota of one credential as reported by `/rate_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    /// The provider accepted the credential
    pub valid: bool,
    /// Search requests left in the current window
    pub remaining: u32,
    /// Search requests per window
    pub limit: u32,
    /// When the window resets
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    search: RateLimitBucket,
}

#[derive(Debug, Deserialize)]
struct RateLimitBucket {
    limit: u32,
    remaining: u32,
    reset: i64,
}

/// GitHub search client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    gist_base: String,
}

impl GitHubClient {
    /// Build a client with timeouts from `config`.
    pub fn new(config: &EngineConfig) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetcherError::ClientSetup(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, config: &EngineConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            gist_base: config.gist_base.trim_end_matches('/').to_string(),
        }
    }

    /// Query `/rate_limit` for the search quota of `secret`.
    ///
    /// Does not consume search quota. A 401 yields `valid: false`.
    pub async fn search_quota(&self, secret: &str) -> FetcherResult<QuotaStatus> {
        let url = format!("{}/rate_limit", self.api_base);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, API_MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(AUTHORIZATION, format!("Bearer {secret}"))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Ok(QuotaStatus {
                valid: false,
                remaining: 0,
                limit: 0,
                reset_at: None,
            });
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(FetcherError::NetworkError(format!(
                "rate limit check failed with {status}: {}",
                parse_error_message(&body)
            )));
        }

        let parsed: RateLimitBody = serde_json::from_str(&body)
            .map_err(|e| FetcherError::ParseError(format!("Failed to parse rate limit: {e}")))?;
        let search = parsed.resources.search;
        Ok(QuotaStatus {
            valid: true,
            remaining: search.remaining,
            limit: search.limit,
            reset_at: Utc.timestamp_opt(search.reset, 0).single(),
        })
    }

    async fn search_api(&self, request: &SearchRequest, secret: &str) -> FetcherResult<RequestResult> {
        let endpoint = match request.kind {
            SearchKind::Repository => "repositories",
            SearchKind::Code => "code",
            SearchKind::Gist => {
                return Err(FetcherError::Unsupported(
                    "gists have no REST search endpoint".to_string(),
                ))
            }
        };
        let url = format!("{}/search/{endpoint}", self.api_base);
        debug!(url = %url, page = request.page, "Making search request");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", request.query.clone()),
                ("page", request.page.to_string()),
                ("per_page", request.per_page.to_string()),
            ])
            .header(ACCEPT, API_MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(AUTHORIZATION, format!("Bearer {secret}"))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let mut result = RequestResult {
            http_status: status,
            ..RequestResult::default()
        };
        parse_rate_headers(response.headers(), &mut result);

        let body = response.text().await.map_err(map_reqwest_error)?;
        if (200..300).contains(&status) {
            let page = parse_search_page(request.kind, &body)?;
            result.items = page.items;
            result.total_count = page.total_count;
            result.incomplete_results = page.incomplete_results;
        } else {
            result.message = Some(parse_error_message(&body));
        }
        Ok(result)
    }

    async fn search_gists(&self, request: &SearchRequest) -> FetcherResult<RequestResult> {
        let url = format!("{}/search", self.gist_base);
        debug!(url = %url, page = request.page, "Making gist search request");

        let response = self
            .client
            .get(&url)
            .query(&[("q", request.query.clone()), ("p", request.page.to_string())])
            .header(ACCEPT, "text/html")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let mut result = RequestResult {
            http_status: status,
            ..RequestResult::default()
        };
        parse_rate_headers(response.headers(), &mut result);

        let body = response.text().await.map_err(map_reqwest_error)?;
        if (200..300).contains(&status) {
            let (items, total) = parse_gist_page(&body, &self.gist_base);
            match total {
                Some(total) => result.total_count = total,
                None => {
                    result.total_count = items.len() as u64;
                    result.total_estimated = true;
                }
            }
            result.items = items;
        } else {
            result.message = Some(parse_error_message(&body));
        }
        Ok(result)
    }
}

#[async_trait]
impl SearchProvider for GitHubClient {
    async fn search(&self, request: &SearchRequest, secret: &str) -> FetcherResult<RequestResult> {
        match request.kind {
            SearchKind::Gist => self.search_gists(request).await,
            SearchKind::Repository | SearchKind::Code => self.search_api(request, secret).await,
        }
    }

    fn max_page_size(&self, kind: SearchKind) -> u32 {
        match kind {
            SearchKind::Gist => GIST_PAGE_SIZE,
            SearchKind::Repository | SearchKind::Code => crate::engine::config::MAX_PAGE_SIZE,
        }
    }

    fn name(&self) -> &str {
        "github"
    }
}

/// Copy `X-RateLimit-*` and `Retry-After` into `result`.
pub fn parse_rate_headers(headers: &HeaderMap, result: &mut RequestResult) {
    let number = |name: &str| -> Option<i64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };

    result.rate_remaining = number("x-ratelimit-remaining").and_then(|v| u32::try_from(v).ok());
    result.rate_limit = number("x-ratelimit-limit").and_then(|v| u32::try_from(v).ok());
    result.rate_reset = number("x-ratelimit-reset").and_then(|v| Utc.timestamp_opt(v, 0).single());
    result.retry_after = number(RETRY_AFTER.as_str())
        .and_then(|v| u64::try_from(v).ok())
        .map(Duration::from_secs);
}

fn map_reqwest_error(e: reqwest::Error) -> FetcherError {
    if e.is_timeout() {
        FetcherError::Timeout(e.to_string())
    } else {
        FetcherError::NetworkError(e.to_string())
    }
}

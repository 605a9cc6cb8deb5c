//! Observability metrics for search runs
//!
//! Counters and histograms for provider requests, rate-limit penalties,
//! governor waits, window partitioning and item discovery.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; recording is a no-op until a recorder
//!   is installed
//! - [`init_metrics`] installs a Prometheus exporter with a scrape endpoint
//! - Metric names and labels are fixed here so call sites stay one-liners

use crate::SearchKind;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global exporter initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Initialize metrics with a Prometheus exporter listening on `addr`.
///
/// Idempotent: later calls return `Ok(())` without reinstalling.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "search_requests_total",
        Unit::Count,
        "Search requests sent to the provider, by kind and status"
    );
    describe_histogram!(
        "search_request_duration_seconds",
        Unit::Seconds,
        "Search request duration in seconds"
    );
    describe_counter!(
        "search_penalties_total",
        Unit::Count,
        "Rate-limit and abuse-detection penalties received"
    );
    describe_histogram!(
        "governor_wait_seconds",
        Unit::Seconds,
        "Time spent waiting on rate limits, by reason"
    );
    describe_counter!(
        "windows_split_total",
        Unit::Count,
        "Windows split because they exceeded the result cap"
    );
    describe_counter!(
        "windows_completed_total",
        Unit::Count,
        "Windows fully retrieved"
    );
    describe_counter!(
        "windows_failed_total",
        Unit::Count,
        "Windows retired without complete results"
    );
    describe_counter!(
        "items_discovered_total",
        Unit::Count,
        "Distinct items discovered"
    );
    describe_gauge!(
        "credentials_active",
        Unit::Count,
        "Credentials currently eligible for selection"
    );

    *initialized = true;
    info!("Metrics system initialized successfully");
    Ok(())
}

/// Whether [`init_metrics`] has completed.
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Timing and outcome of one search request.
pub struct RequestMetrics {
    kind: SearchKind,
    page: u32,
    start_time: Instant,
}

impl RequestMetrics {
    /// Start timing a request.
    pub fn start(kind: SearchKind, page: u32) -> Self {
        Self {
            kind,
            page,
            start_time: Instant::now(),
        }
    }

    /// Record a response with `status_code`.
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "search_requests_total",
            "kind" => self.kind.as_str(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "search_request_duration_seconds",
            "kind" => self.kind.as_str(),
        )
        .record(duration.as_secs_f64());

        debug!(
            kind = %self.kind,
            page = self.page,
            status = status_code,
            duration_ms = duration.as_millis(),
            "Search request completed"
        );
    }

    /// Record a request that produced no response.
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "search_requests_total",
            "kind" => self.kind.as_str(),
            "status" => "network_error",
        )
        .increment(1);

        warn!(
            kind = %self.kind,
            page = self.page,
            duration_ms = duration.as_millis(),
            "Search request failed without a response"
        );
    }
}

/// Record a rate-limit penalty (`rate_limit` or `abuse`).
pub fn record_penalty(reason: &'static str) {
    counter!("search_penalties_total", "reason" => reason).increment(1);
}

/// Record time spent waiting on rate limits.
pub fn record_wait(reason: &'static str, duration: Duration) {
    histogram!("governor_wait_seconds", "reason" => reason).record(duration.as_secs_f64());
}

/// Record a window split.
pub fn record_split(kind: SearchKind) {
    counter!("windows_split_total", "kind" => kind.as_str()).increment(1);
}

/// Record a completed window.
pub fn record_window_completed(kind: SearchKind, truncated: bool) {
    counter!(
        "windows_completed_total",
        "kind" => kind.as_str(),
        "truncated" => truncated.to_string(),
    )
    .increment(1);
}

/// Record a window retired as failed.
pub fn record_window_failed(kind: SearchKind) {
    counter!("windows_failed_total", "kind" => kind.as_str()).increment(1);
}

/// Record newly discovered items.
pub fn record_items(kind: SearchKind, count: u64) {
    if count > 0 {
        counter!("items_discovered_total", "kind" => kind.as_str()).increment(count);
    }
}

/// Update the active credential gauge.
pub fn record_active_credentials(count: usize) {
    gauge!("credentials_active").set(count as f64);
}

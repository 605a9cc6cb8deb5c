//! Shared fixtures: an in-process search provider with scripted failures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::json;
use slicehound::engine::{DelaySpec, EngineConfig};
use slicehound::fetcher::{FetcherResult, RequestResult, SearchProvider, SearchRequest};
use slicehound::shutdown::SharedShutdown;
use slicehound::{SearchItem, SearchKind, SearchWindow};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

pub const CAP: u64 = 1000;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine config with no inter-request delay and a fixed jitter seed.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        delay: DelaySpec::Fixed(0.0),
        jitter_seed: Some(42),
        ..EngineConfig::default()
    }
}

/// `n` distinct secrets long enough to be masked.
pub fn secrets(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("ghp_testtoken{i:02}abcdefgh")).collect()
}

/// One request the provider received.
#[derive(Debug, Clone)]
pub struct Call {
    pub kind: SearchKind,
    pub window: SearchWindow,
    pub page: u32,
    pub per_page: u32,
    pub secret: String,
}

/// Provider backed by a per-day item count.
///
/// Reports the true total for a window but, like the real API, serves only
/// the first `CAP` matches. Scripted responses are returned, in order, ahead
/// of any computed page.
pub struct MockProvider {
    days: BTreeMap<NaiveDate, u64>,
    script: Mutex<VecDeque<RequestResult>>,
    rejected: HashSet<String>,
    calls: Mutex<Vec<Call>>,
    cancel: Option<(SharedShutdown, usize)>,
    hide_totals: bool,
    inflate: u64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            days: BTreeMap::new(),
            script: Mutex::new(VecDeque::new()),
            rejected: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            cancel: None,
            hide_totals: false,
            inflate: 0,
        }
    }

    /// `count` items created on `day`.
    pub fn with_day(mut self, day: NaiveDate, count: u64) -> Self {
        *self.days.entry(day).or_default() += count;
        self
    }

    /// `total` items dealt round-robin over the days of `window`.
    pub fn spread(mut self, window: SearchWindow, total: u64) -> Self {
        let days = window.days() as u64;
        for i in 0..total {
            let day = window.start() + Duration::days((i % days) as i64);
            *self.days.entry(day).or_default() += 1;
        }
        self
    }

    /// Answer 401 to every request made with `secret`.
    pub fn reject(mut self, secret: &str) -> Self {
        self.rejected.insert(secret.to_string());
        self
    }

    /// Serve `result` to the next request.
    pub fn script(self, result: RequestResult) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    /// Report no totals, like gist search pages without a results banner.
    pub fn without_totals(mut self) -> Self {
        self.hide_totals = true;
        self
    }

    /// Report `extra` more matches than can actually be served.
    pub fn inflate_totals(mut self, extra: u64) -> Self {
        self.inflate = extra;
        self
    }

    /// Request shutdown once `after` requests have been received.
    pub fn cancel_after(mut self, shutdown: SharedShutdown, after: usize) -> Self {
        self.cancel = Some((shutdown, after));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Matches within `window`.
    pub fn total_in(&self, window: &SearchWindow) -> u64 {
        self.days.range(window.start()..=window.end()).map(|(_, n)| n).sum()
    }

    /// Provider ids of every item of `kind` within `window`, in serving order.
    pub fn expected_ids(&self, window: &SearchWindow) -> Vec<String> {
        self.days
            .range(window.start()..=window.end())
            .flat_map(|(day, n)| (0..*n).map(move |i| item_id(*day, i)))
            .collect()
    }

    fn items_in(&self, kind: SearchKind, window: &SearchWindow) -> impl Iterator<Item = SearchItem> + '_ {
        self.days
            .range(window.start()..=window.end())
            .flat_map(move |(day, n)| (0..*n).map(move |i| make_item(kind, *day, i)))
    }
}

fn item_id(day: NaiveDate, i: u64) -> String {
    format!("{day}-{i}")
}

fn make_item(kind: SearchKind, day: NaiveDate, i: u64) -> SearchItem {
    SearchItem {
        kind,
        provider_id: item_id(day, i),
        url: format!("https://example.test/{kind}/{day}/{i}"),
        name: format!("{kind}-{day}-{i}"),
        owner: Some("octocat".to_string()),
        metadata: json!({ "created_at": day.to_string() }),
    }
}

/// Recover the window from the `created:` qualifier of a query.
fn window_of(query: &str) -> SearchWindow {
    let (_, qualifier) = query.rsplit_once("created:").expect("query has no created qualifier");
    match qualifier.split_once("..") {
        Some((start, end)) => {
            SearchWindow::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
        }
        None => SearchWindow::day(qualifier.parse().unwrap()),
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    async fn search(&self, request: &SearchRequest, secret: &str) -> FetcherResult<RequestResult> {
        let window = window_of(&request.query);
        let received = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                kind: request.kind,
                window,
                page: request.page,
                per_page: request.per_page,
                secret: secret.to_string(),
            });
            calls.len()
        };
        if let Some((shutdown, after)) = &self.cancel {
            if received >= *after {
                shutdown.request_shutdown();
            }
        }

        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return Ok(result);
        }
        if self.rejected.contains(secret) {
            return Ok(RequestResult::error(401, "Bad credentials"));
        }

        let total = self.total_in(&window);
        let offset = u64::from(request.page - 1) * u64::from(request.per_page);
        if offset >= CAP {
            return Ok(RequestResult::error(
                422,
                "Only the first 1000 search results are available",
            ));
        }
        let end = (offset + u64::from(request.per_page)).min(total.min(CAP));
        let items = self
            .items_in(request.kind, &window)
            .skip(offset as usize)
            .take(end.saturating_sub(offset) as usize)
            .collect();
        let mut result = RequestResult::page(items, total + self.inflate);
        if self.hide_totals {
            result.total_count = result.items.len() as u64;
            result.total_estimated = true;
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

//! GitHub response parsing: REST JSON pages and gist search HTML

use crate::fetcher::{FetcherError, FetcherResult};
use crate::{SearchItem, SearchKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

/// Gist links in search results: `/owner/<32 hex id>`
static GIST_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="/([A-Za-z0-9][A-Za-z0-9-]*)/([a-f0-9]{32})""#)
        .unwrap_or_else(|e| panic!("gist link pattern is invalid: {e}"))
});

/// "We've found 1,234 gist results"
static GIST_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)found\s+([\d,]+)\s+gist\s+results?")
        .unwrap_or_else(|e| panic!("gist total pattern is invalid: {e}"))
});

/// One page of the search REST API.
#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Error body of the REST API.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Items, total and incomplete flag of one parsed page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Items on the page
    pub items: Vec<SearchItem>,
    /// Total matches reported
    pub total_count: u64,
    /// Provider timed out and returned a partial result set
    pub incomplete_results: bool,
}

/// Parse a `/search/repositories` or `/search/code` JSON body.
///
/// Items missing their identity fields are skipped with a warning rather than
/// failing the page.
pub fn parse_search_page(kind: SearchKind, body: &str) -> FetcherResult<ParsedPage> {
    let page: SearchPage = serde_json::from_str(body)
        .map_err(|e| FetcherError::ParseError(format!("Failed to parse {kind} search page: {e}")))?;

    let parse: fn(Value) -> Option<SearchItem> = match kind {
        SearchKind::Repository => parse_repository,
        SearchKind::Code => parse_code,
        SearchKind::Gist => {
            return Err(FetcherError::Unsupported(
                "gists have no REST search endpoint".to_string(),
            ))
        }
    };

    let mut items = Vec::with_capacity(page.items.len());
    for raw in page.items {
        match parse(raw) {
            Some(item) => items.push(item),
            None => warn!(%kind, "Skipping search item without identity fields"),
        }
    }

    Ok(ParsedPage {
        items,
        total_count: page.total_count,
        incomplete_results: page.incomplete_results,
    })
}

/// Repository search item. Identity is the numeric repository id.
pub fn parse_repository(raw: Value) -> Option<SearchItem> {
    let Value::Object(mut fields) = raw else {
        return None;
    };
    let id = fields.get("id")?.as_u64()?;
    let name = take_string(&mut fields, "full_name")
        .or_else(|| take_string(&mut fields, "name"))
        .unwrap_or_else(|| id.to_string());
    let url = take_string(&mut fields, "html_url").unwrap_or_default();
    let owner = fields
        .remove("owner")
        .and_then(|owner| owner.get("login")?.as_str().map(str::to_string));

    Some(SearchItem {
        kind: SearchKind::Repository,
        provider_id: id.to_string(),
        url,
        name,
        owner,
        metadata: pick(
            &fields,
            &[
                "created_at",
                "updated_at",
                "description",
                "language",
                "stargazers_count",
                "fork",
            ],
        ),
    })
}

/// Code search item. Code results carry no id; identity is
/// `repository id : path : blob sha`.
pub fn parse_code(raw: Value) -> Option<SearchItem> {
    let Value::Object(mut fields) = raw else {
        return None;
    };
    let sha = take_string(&mut fields, "sha")?;
    let path = take_string(&mut fields, "path")?;
    let repository = fields.remove("repository")?;
    let repo_id = repository.get("id")?.as_u64()?;
    let repo_name = repository
        .get("full_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let owner = repository
        .get("owner")
        .and_then(|owner| owner.get("login"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let url = take_string(&mut fields, "html_url").unwrap_or_default();

    let mut metadata = pick(&fields, &["name", "score"]);
    if let Value::Object(map) = &mut metadata {
        map.insert("repository".to_string(), Value::String(repo_name.clone()));
        map.insert("sha".to_string(), Value::String(sha.clone()));
    }

    Some(SearchItem {
        kind: SearchKind::Code,
        provider_id: format!("{repo_id}:{path}:{sha}"),
        url,
        name: format!("{repo_name}/{path}"),
        owner,
        metadata,
    })
}

/// Parse a gist search results page.
///
/// Returns the gists linked on the page (first occurrence of each id, in page
/// order) and the total from the results banner when present.
pub fn parse_gist_page(html: &str, gist_base: &str) -> (Vec<SearchItem>, Option<u64>) {
    let total = GIST_TOTAL
        .captures(html)
        .and_then(|caps| caps[1].replace(',', "").parse().ok());

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for caps in GIST_LINK.captures_iter(html) {
        let (owner, id) = (&caps[1], &caps[2]);
        if !seen.insert(id.to_string()) {
            continue;
        }
        items.push(SearchItem {
            kind: SearchKind::Gist,
            provider_id: id.to_string(),
            url: format!("{}/{owner}/{id}", gist_base.trim_end_matches('/')),
            name: id[..12].to_string(),
            owner: Some(owner.to_string()),
            metadata: Value::Null,
        });
    }
    (items, total)
}

/// Extract `message` from an error body, falling back to the raw text.
pub fn parse_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) => error.message,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn pick(fields: &Map<String, Value>, keys: &[&str]) -> Value {
    let picked: Map<String, Value> = keys
        .iter()
        .filter_map(|&key| {
            fields
                .get(key)
                .filter(|v| !v.is_null())
                .map(|v| (key.to_string(), v.clone()))
        })
        .collect();
    Value::Object(picked)
}

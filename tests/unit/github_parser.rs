//! GitHub response parsing

use serde_json::json;
use slicehound::fetcher::github_parser::{parse_gist_page, parse_search_page};
use slicehound::fetcher::FetcherError;
use slicehound::SearchKind;

#[test]
fn test_code_page_with_incomplete_flag() {
    let body = json!({
        "total_count": 1870,
        "incomplete_results": true,
        "items": [
            {
                "name": "deploy.yml",
                "path": ".github/workflows/deploy.yml",
                "sha": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "html_url": "https://github.com/acme/site/blob/main/.github/workflows/deploy.yml",
                "repository": { "id": 7, "full_name": "acme/site", "owner": { "login": "acme" } },
                "score": 1.0
            },
            {
                "name": "deploy.yml",
                "path": ".github/workflows/deploy.yml",
                "sha": "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                "repository": { "id": 7, "full_name": "acme/site" }
            },
            { "name": "orphan.txt", "path": "orphan.txt", "sha": "cccc" }
        ]
    })
    .to_string();

    let page = parse_search_page(SearchKind::Code, &body).unwrap();
    assert_eq!(page.total_count, 1870);
    assert!(page.incomplete_results);
    // Same path at two blob versions are distinct items; no repository, no identity
    assert_eq!(page.items.len(), 2);
    assert_ne!(page.items[0].key(), page.items[1].key());
    assert_eq!(page.items[0].owner.as_deref(), Some("acme"));
    assert!(page.items[1].owner.is_none());
    assert!(page.items.iter().all(|item| item.kind == SearchKind::Code));
}

#[test]
fn test_empty_page() {
    let page = parse_search_page(
        SearchKind::Repository,
        r#"{"total_count":0,"incomplete_results":false,"items":[]}"#,
    )
    .unwrap();
    assert_eq!(page.total_count, 0);
    assert!(page.items.is_empty());
}

#[test]
fn test_gist_kind_has_no_json_page() {
    let err = parse_search_page(SearchKind::Gist, r#"{"total_count":0,"items":[]}"#).unwrap_err();
    assert!(matches!(err, FetcherError::Unsupported(_)));
}

#[test]
fn test_gist_page_without_banner() {
    let html = r#"
        <a href="/carol/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa">carol / a.txt</a>
        <a href="/carol/not-a-gist">profile</a>
        <a href="/carol/AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA">upper</a>
    "#;
    let (items, total) = parse_gist_page(html, "https://gist.github.com");
    assert_eq!(total, None);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].provider_id, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    assert_eq!(items[0].kind, SearchKind::Gist);
}

#[test]
fn test_gist_page_with_no_results() {
    let (items, total) = parse_gist_page("<p>We couldn’t find any gists matching</p>", "https://gist.github.com");
    assert!(items.is_empty());
    assert_eq!(total, None);
}

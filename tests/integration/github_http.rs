//! GitHub client against a local mock server

use crate::support::{date, secrets, test_config};
use serde_json::json;
use slicehound::auth::CredentialPool;
use slicehound::engine::{EngineConfig, Orchestrator, ResultStore};
use slicehound::fetcher::github_http::GitHubClient;
use slicehound::fetcher::query::build_query;
use slicehound::fetcher::{FetcherError, ResponseClass, SearchProvider, SearchRequest};
use slicehound::output::MemorySink;
use slicehound::{SearchKind, SearchWindow};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "ghp_integrationtoken0001";

fn client(server: &MockServer) -> GitHubClient {
    let config = EngineConfig {
        api_base: server.uri(),
        gist_base: server.uri(),
        request_timeout_secs: 5,
        ..EngineConfig::default()
    };
    GitHubClient::new(&config).unwrap()
}

fn request(kind: SearchKind, page: u32) -> SearchRequest {
    let window = SearchWindow::new(date(2023, 1, 1), date(2023, 1, 31)).unwrap();
    SearchRequest {
        kind,
        query: build_query("acme.io", &window),
        page,
        per_page: 100,
    }
}

#[tokio::test]
async fn test_repository_search_parses_page_and_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "\"acme.io\" created:2023-01-01..2023-01-31"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "28")
                .insert_header("x-ratelimit-limit", "30")
                .insert_header("x-ratelimit-reset", "1700000060")
                .set_body_json(json!({
                    "total_count": 2,
                    "incomplete_results": false,
                    "items": [
                        {
                            "id": 101,
                            "full_name": "octocat/acme-tools",
                            "html_url": "https://github.com/octocat/acme-tools",
                            "owner": { "login": "octocat" },
                            "created_at": "2023-01-04T10:00:00Z"
                        },
                        {
                            "id": 102,
                            "full_name": "hubot/acme-io",
                            "html_url": "https://github.com/hubot/acme-io",
                            "owner": { "login": "hubot" }
                        }
                    ]
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .search(&request(SearchKind::Repository, 2), TOKEN)
        .await
        .unwrap();

    assert_eq!(result.class(), ResponseClass::Success);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].provider_id, "101");
    assert_eq!(result.items[1].owner.as_deref(), Some("hubot"));
    assert_eq!(result.rate_remaining, Some(28));
    assert_eq!(result.rate_limit, Some(30));
    assert_eq!(result.rate_reset.unwrap().timestamp(), 1_700_000_060);
}

#[tokio::test]
async fn test_rate_limit_response_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "45")
                .set_body_json(json!({
                    "message": "API rate limit exceeded for user ID 1.",
                    "documentation_url": "https://docs.github.com/rest"
                })),
        )
        .mount(&server)
        .await;

    let result = client(&server)
        .search(&request(SearchKind::Code, 1), TOKEN)
        .await
        .unwrap();

    assert_eq!(result.http_status, 403);
    assert_eq!(result.class(), ResponseClass::RateLimited);
    assert_eq!(result.retry_after, Some(Duration::from_secs(45)));
    assert!(result.items.is_empty());
}

#[tokio::test]
async fn test_secondary_limit_is_abuse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "You have exceeded a secondary rate limit. Please wait a few minutes before you try again."
        })))
        .mount(&server)
        .await;

    let result = client(&server)
        .search(&request(SearchKind::Repository, 1), TOKEN)
        .await
        .unwrap();
    assert_eq!(result.class(), ResponseClass::AbuseDetected);
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .search(&request(SearchKind::Repository, 1), TOKEN)
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::ParseError(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_gist_search_scrapes_html() {
    let server = MockServer::start().await;
    let html = r#"
        <h3>We've found 1,204 gist results</h3>
        <a href="/octocat/0123456789abcdef0123456789abcdef">octocat / notes.md</a>
        <a href="/octocat/0123456789abcdef0123456789abcdef">notes.md</a>
        <a href="/hubot/fedcba9876543210fedcba9876543210">hubot / deploy.sh</a>
    "#;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("p", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let result = client.search(&request(SearchKind::Gist, 3), TOKEN).await.unwrap();

    assert_eq!(result.total_count, 1204);
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].provider_id, "0123456789abcdef0123456789abcdef");
    assert_eq!(
        result.items[1].url,
        format!("{}/hubot/fedcba9876543210fedcba9876543210", server.uri())
    );
    assert_eq!(client.max_page_size(SearchKind::Gist), 10);
}

fn gist_links(ids: std::ops::Range<u32>) -> String {
    ids.map(|i| format!("<a href=\"/octocat/{i:032x}\">octocat / file{i}.txt</a>\n"))
        .collect()
}

#[tokio::test]
async fn test_gist_pages_without_banner_are_followed() {
    let server = MockServer::start().await;
    for (page, body) in [(1, gist_links(0..10)), (2, gist_links(10..15))] {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("p", page.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = EngineConfig {
        api_base: server.uri(),
        gist_base: server.uri(),
        request_timeout_secs: 5,
        ..test_config()
    };
    let provider = GitHubClient::new(&config).unwrap();
    let pool = CredentialPool::new(secrets(1), &config).unwrap();
    let sink = MemorySink::new();
    let store = ResultStore::with_sink(Box::new(sink.clone()));
    let mut orchestrator = Orchestrator::new(provider, pool, store, config).unwrap();

    let window = SearchWindow::new(date(2023, 1, 1), date(2023, 1, 31)).unwrap();
    let summary = orchestrator
        .run("acme.io", &[SearchKind::Gist], window)
        .await
        .unwrap();

    assert_eq!(summary.items_discovered, 15);
    assert_eq!(summary.requests, 2);
    assert!(summary.warnings.is_empty());
    assert_eq!(sink.items().len(), 15);
}

#[tokio::test]
async fn test_search_quota() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": {
                "core": { "limit": 5000, "remaining": 4999, "reset": 1700003600 },
                "search": { "limit": 30, "remaining": 17, "reset": 1700000060 }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })))
        .mount(&server)
        .await;

    let client = client(&server);
    let status = client.search_quota(TOKEN).await.unwrap();
    assert!(status.valid);
    assert_eq!(status.remaining, 17);
    assert_eq!(status.limit, 30);
    assert_eq!(status.reset_at.unwrap().timestamp(), 1_700_000_060);

    let revoked = client.search_quota("ghp_revokedtoken000000").await.unwrap();
    assert!(!revoked.valid);
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let config = EngineConfig {
        api_base: "http://127.0.0.1:1".to_string(),
        request_timeout_secs: 2,
        ..EngineConfig::default()
    };
    let client = GitHubClient::new(&config).unwrap();
    let err = client
        .search(&request(SearchKind::Repository, 1), TOKEN)
        .await
        .unwrap_err();
    assert!(err.is_transient(), "unexpected error {err:?}");
}

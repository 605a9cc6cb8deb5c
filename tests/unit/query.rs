//! Query strings and date windows

use crate::support::date;
use slicehound::fetcher::query::{build_query, created_qualifier};
use slicehound::{SearchKind, SearchWindow, WindowError};

#[test]
fn test_term_is_trimmed_before_quoting() {
    let window = SearchWindow::day(date(2019, 12, 31));
    assert_eq!(build_query("  acme.io \n", &window), "\"acme.io\" created:2019-12-31");
}

#[test]
fn test_quoted_phrase_passes_through() {
    let window = SearchWindow::new(date(2019, 1, 1), date(2019, 1, 2)).unwrap();
    assert_eq!(
        build_query("\"internal.acme.io\"", &window),
        "\"internal.acme.io\" created:2019-01-01..2019-01-02"
    );
}

#[test]
fn test_qualifier_matches_window_display() {
    let range = SearchWindow::years(2016, 2017).unwrap();
    assert_eq!(created_qualifier(&range), format!("created:{range}"));
    let day = SearchWindow::day(date(2016, 2, 29));
    assert_eq!(created_qualifier(&day), format!("created:{day}"));
}

#[test]
fn test_inverted_window_rejected() {
    let err = SearchWindow::new(date(2020, 2, 1), date(2020, 1, 1)).unwrap_err();
    assert!(matches!(err, WindowError::Inverted { .. }));
}

#[test]
fn test_window_arithmetic() {
    let window = SearchWindow::years(2020, 2020).unwrap();
    assert_eq!(window.days(), 366);
    assert!(window.contains(date(2020, 2, 29)));
    assert!(!window.contains(date(2021, 1, 1)));
    assert!(!window.is_single_day());
}

#[test]
fn test_kind_parsing() {
    assert_eq!("repos".parse::<SearchKind>(), Ok(SearchKind::Repository));
    assert_eq!("Gists".parse::<SearchKind>(), Ok(SearchKind::Gist));
    assert!("issues".parse::<SearchKind>().is_err());
}

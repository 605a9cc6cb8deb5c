//! Search query construction

use crate::SearchWindow;

/// Build the query string for `term` restricted to `window`.
///
/// A bare term is quoted so multi-word or dotted terms match as a phrase;
/// a term that already carries qualifiers (`key:value`) or quotes is passed
/// through. The creation-date qualifier uses the inclusive range syntax,
/// collapsing to a single date for one-day windows.
pub fn build_query(term: &str, window: &SearchWindow) -> String {
    let term = term.trim();
    let term = if term.contains(':') || term.contains('"') {
        term.to_string()
    } else {
        format!("\"{term}\"")
    };
    format!("{term} {}", created_qualifier(window))
}

/// `created:` qualifier for `window`.
pub fn created_qualifier(window: &SearchWindow) -> String {
    if window.is_single_day() {
        format!("created:{}", window.start())
    } else {
        format!("created:{}..{}", window.start(), window.end())
    }
}

//! Subject-key extraction from raw keys or ticket URLs
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Ticket key (PROJECT-123)
    static ref SUBJECT_KEY: Regex = Regex::new(r"[A-Z][A-Z0-9]+-\d+").unwrap();
}

/// Pull a ticket key out of user input.
///
/// URLs are matched on their path only; anything else is upper-cased first.
pub fn extract_subject_key(input: &str) -> Option<String> {
    let input = input.trim();
    let haystack = if input.starts_with("http://") || input.starts_with("https://") {
        url_path(input).to_string()
    } else {
        input.to_uppercase()
    };
    SUBJECT_KEY.find(&haystack).map(|m| m.as_str().to_string())
}

fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let path = rest.find('/').map(|i| &rest[i..]).unwrap_or("");
    path.split(['?', '#']).next().unwrap_or("")
}

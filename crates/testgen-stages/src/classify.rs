//! Attachment and linked-page classification
use lazy_static::lazy_static;
use regex::Regex;
use testgen_core::{MaterialCategory, TicketRecord};

lazy_static! {
    /// Requirement document file names
    static ref REQUIREMENT_PATTERNS: Vec<Regex> = [
        r"(?i)^.*prd.*\.(pdf|docx?)$",
        r"(?i)^.*product.*requirement.*\.(pdf|docx?)$",
        r"(?i)^.*requirement.*document.*\.(pdf|docx?)$",
        r"(?i)^.*functional.*spec.*\.pdf$",
        r"(?i)^.*business.*requirement.*\.pdf$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    /// Design document file names (HLD/LLD)
    static ref DESIGN_PATTERNS: Vec<Regex> = [
        r"(?i)^.*hld.*\.(pdf|docx?)$",
        r"(?i)^.*lld.*\.(pdf|docx?)$",
        r"(?i)^.*high.*level.*design.*\.pdf$",
        r"(?i)^.*low.*level.*design.*\.pdf$",
        r"(?i)^.*technical.*design.*\.pdf$",
        r"(?i)^.*architecture.*\.pdf$",
        r"(?i)^.*design.*\.(pdf|docx?)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    /// Wiki page links
    static ref PAGE_LINK_PATTERNS: Vec<Regex> = [
        r"(?i)https?://[^/\s]+/wiki/spaces/[^/\s]+/pages/\d+/[^\s\)]+",
        r"(?i)https?://[^/\s]+/display/[^/\s]+/[^\s\)]+",
        r"(?i)https?://[^/\s]+\.atlassian\.net/wiki/[^\s\)]+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// Category an attachment satisfies, judged by file name.
/// Requirements win over design when both match.
pub fn classify_attachment(filename: &str) -> Option<MaterialCategory> {
    let name = filename.trim();
    if REQUIREMENT_PATTERNS.iter().any(|p| p.is_match(name)) {
        Some(MaterialCategory::Requirements)
    } else if DESIGN_PATTERNS.iter().any(|p| p.is_match(name)) {
        Some(MaterialCategory::Design)
    } else {
        None
    }
}

/// Wiki page links in `text`, de-duplicated in first-seen order
pub fn extract_page_links(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = PAGE_LINK_PATTERNS
        .iter()
        .flat_map(|p| p.find_iter(text).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort_by_key(|(start, _)| *start);

    let mut links: Vec<String> = Vec::new();
    for (_, link) in found {
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

/// Locators on `ticket` that could satisfy `category`, as (locator, label)
pub fn locators_for(ticket: &TicketRecord, category: MaterialCategory) -> Vec<(String, String)> {
    match category {
        MaterialCategory::SupplementaryPages => extract_page_links(&ticket.body)
            .into_iter()
            .map(|link| (link.clone(), link))
            .collect(),
        _ => ticket
            .attachments
            .iter()
            .filter(|a| classify_attachment(&a.filename) == Some(category))
            .map(|a| (a.locator.clone(), a.filename.clone()))
            .collect(),
    }
}

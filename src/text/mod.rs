//! Text normalization heuristics applied to extracted fields
//!
//! Selector matches come back as raw element text. These helpers collapse
//! whitespace, canonicalize job types, pick salary fragments out of longer
//! text and infer a state code from a free-text location.

mod location;

pub use location::{extract_state_from_location, normalize_state};

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static SALARY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\$[\d,]+(?:\.\d{2})?(?:\s*-\s*\$[\d,]+(?:\.\d{2})?)?(?:\s*(?:per|/)\s*(?:hour|hr|year|yr|annual|month|mo))?",
        r"(?i)[\d,]+(?:\s*-\s*[\d,]+)?\s*(?:per|/)\s*(?:hour|hr|year|yr|annual|month|mo)",
        r"(?i)(?:salary|pay|wage|compensation)[:\s]*\$?[\d,]+(?:\s*-\s*\$?[\d,]+)?",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Collapses runs of whitespace and trims; empty results become None
///
/// # Examples
///
/// ```
/// use job_harvest::text::clean_text;
///
/// assert_eq!(clean_text("  Line\n  Cook \t"), Some("Line Cook".to_string()));
/// assert_eq!(clean_text(" \n "), None);
/// ```
pub fn clean_text(text: &str) -> Option<String> {
    let cleaned = WHITESPACE.replace_all(text, " ").trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Maps free-text job types onto the catalog's canonical labels
///
/// Unrecognized text is kept, cleaned.
pub fn normalize_job_type(job_type: &str) -> Option<String> {
    let lower = job_type.to_lowercase();

    let canonical = if ["full-time", "full time", "fulltime"]
        .iter()
        .any(|t| lower.contains(t))
    {
        "Full-time"
    } else if ["part-time", "part time", "parttime"]
        .iter()
        .any(|t| lower.contains(t))
    {
        "Part-time"
    } else if lower.contains("seasonal") {
        "Seasonal"
    } else if lower.contains("contract") {
        "Contract"
    } else if has_word(&lower, &["temporary", "temp"]) {
        "Temporary"
    } else if has_word(&lower, &["internship", "intern"]) {
        "Internship"
    } else {
        return clean_text(job_type);
    };

    Some(canonical.to_string())
}

fn has_word(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| words.contains(&token))
}

/// Picks the salary fragment out of a longer text
///
/// Returns None when no salary-looking fragment is present.
///
/// # Examples
///
/// ```
/// use job_harvest::text::extract_salary;
///
/// assert_eq!(
///     extract_salary("Pay: $22 - $26 per hour, DOE"),
///     Some("$22 - $26 per hour".to_string())
/// );
/// ```
pub fn extract_salary(text: &str) -> Option<String> {
    SALARY_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(text))
        .and_then(|m| clean_text(m.as_str()))
}

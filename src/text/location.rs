//! US state inference from free-text locations

use regex::Regex;
use std::sync::LazyLock;

/// Full state names and their USPS codes
const US_STATES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

// ", AK" at the end, ", AK 99501", then "AK 99501" anywhere
static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r",\s*([A-Z]{2})\s*$",
        r",\s*([A-Z]{2})\s+\d{5}",
        r"\b([A-Z]{2})\s+\d{5}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// Longest names first so "west virginia" wins over "virginia"
// and "arkansas" over "kansas"
static NAMES_BY_LENGTH: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    let mut names = US_STATES.to_vec();
    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    names
});

fn is_state_code(code: &str) -> bool {
    US_STATES.iter().any(|(_, c)| *c == code)
}

/// Normalizes a state name or abbreviation to its two-letter code
///
/// # Examples
///
/// ```
/// use job_harvest::text::normalize_state;
///
/// assert_eq!(normalize_state("alaska"), Some("AK".to_string()));
/// assert_eq!(normalize_state(" ak "), Some("AK".to_string()));
/// assert_eq!(normalize_state("Yukon"), None);
/// ```
pub fn normalize_state(input: &str) -> Option<String> {
    let cleaned = input.trim().to_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    let upper = cleaned.to_uppercase();
    if is_state_code(&upper) {
        return Some(upper);
    }

    US_STATES
        .iter()
        .find(|(name, _)| *name == cleaned)
        .map(|(_, code)| code.to_string())
}

/// Tries to infer a state code from a free-text location
///
/// Recognizes trailing codes ("Anchorage, AK"), codes followed by a ZIP
/// ("Nome, AK 99762") and full state names ("Bethel, Alaska").
pub fn extract_state_from_location(location: &str) -> Option<String> {
    for pattern in CODE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(location) {
            let code = &caps[1];
            if is_state_code(code) {
                return Some(code.to_string());
            }
        }
    }

    let lower = location.to_lowercase();
    NAMES_BY_LENGTH
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, code)| code.to_string())
}

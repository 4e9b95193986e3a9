//! Response-quality heuristics.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Minimum trimmed length for a response to count as meaningful.
pub const DEFAULT_MIN_LENGTH: usize = 10;

const HALLUCINATION_PATTERNS: &[&str] = &[
    r"i don't (have|know)",
    r"i cannot (access|provide|find)",
    r"as an ai",
    r"i (do not|don't) have access",
    r"please consult",
    r"404",
    r"error",
    r"page not found",
];

static HALLUCINATION_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    HALLUCINATION_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok().map(|re| (*p, re)))
        .collect()
});

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<([a-z]+)[^>]*>").expect("static regex"));
static CLOSE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</([a-z]+)>").expect("static regex"));
static TAG_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<[a-z/]").expect("static regex"));

/// True when the trimmed response has at least `min_length` characters.
pub fn is_meaningful_response(response: &str, min_length: usize) -> bool {
    if response.is_empty() {
        return false;
    }
    let len = response.trim().chars().count();
    debug!("response length {} (min {})", len, min_length);
    len >= min_length
}

/// Keywords (from `keywords`) that occur in `response`, case-insensitively.
pub fn keyword_matches<'k, S: AsRef<str>>(response: &str, keywords: &'k [S]) -> Vec<&'k str> {
    let lower = response.to_lowercase();
    keywords
        .iter()
        .map(AsRef::as_ref)
        .filter(|kw| lower.contains(&kw.to_lowercase()))
        .collect()
}

/// At least `min_matches` of `keywords` appear in the response.
///
/// An empty response never satisfies this, whatever `min_matches` is.
pub fn contains_keywords<S: AsRef<str>>(response: &str, keywords: &[S], min_matches: usize) -> bool {
    if response.is_empty() {
        return false;
    }
    let matches = keyword_matches(response, keywords);
    info!("keyword matches: {}/{} {:?}", matches.len(), keywords.len(), matches);
    matches.len() >= min_matches
}

/// None of `forbidden` appear in the response (case-insensitive).
pub fn does_not_contain<S: AsRef<str>>(response: &str, forbidden: &[S]) -> bool {
    if response.is_empty() {
        return true;
    }
    let found = keyword_matches(response, forbidden);
    if !found.is_empty() {
        warn!("forbidden terms found: {:?}", found);
        return false;
    }
    true
}

/// Hallucination / deflection patterns that match the response.
pub fn hallucination_indicators(response: &str) -> Vec<&'static str> {
    let lower = response.to_lowercase();
    HALLUCINATION_RES
        .iter()
        .filter(|(_, re)| re.is_match(&lower))
        .map(|(p, _)| *p)
        .collect()
}

/// No known "I don't know" / error-page phrasing in the response.
pub fn is_hallucination_free(response: &str) -> bool {
    match hallucination_indicators(response).first() {
        Some(pattern) => {
            warn!("potential hallucination indicator: {}", pattern);
            false
        }
        None => true,
    }
}

/// Describe everything that looks off about the response's formatting.
///
/// Looks for opening tags with no closing tag of the same name, a stray `<`
/// that never starts a tag, and any three-word phrase repeated three or
/// more times.
pub fn formatting_issues(response: &str) -> Vec<String> {
    let mut issues = Vec::new();

    let close_tags: Vec<&str> = CLOSE_TAG
        .captures_iter(response)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    for cap in OPEN_TAG.captures_iter(response) {
        let Some(tag) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if !close_tags.contains(&tag) {
            issues.push(format!("unclosed tag: {}", tag));
        }
    }

    if response.contains('<') && !TAG_START.is_match(response) {
        issues.push("potential broken HTML".to_string());
    }

    let lower = response.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() > 5 {
        for i in 0..words.len() - 4 {
            let phrase = words[i..i + 3].join(" ");
            if lower.matches(phrase.as_str()).count() >= 3 {
                issues.push(format!("excessive repetition: '{}'", phrase));
                break;
            }
        }
    }

    issues
}

/// No formatting issues found.
pub fn is_well_formatted(response: &str) -> bool {
    let issues = formatting_issues(response);
    if !issues.is_empty() {
        warn!("formatting issues: {:?}", issues);
        return false;
    }
    true
}

/// What a response is expected to contain and avoid.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseExpectations {
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default)]
    pub forbidden_terms: Vec<String>,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

impl Default for ResponseExpectations {
    fn default() -> Self {
        Self {
            expected_keywords: Vec::new(),
            forbidden_terms: Vec::new(),
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

impl ResponseExpectations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keywords<S: Into<String>>(mut self, words: impl IntoIterator<Item = S>) -> Self {
        self.expected_keywords = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn forbidden<S: Into<String>>(mut self, terms: impl IntoIterator<Item = S>) -> Self {
        self.forbidden_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = min;
        self
    }
}

/// Combined verdicts of [`validate_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_meaningful: bool,
    pub is_well_formatted: bool,
    pub is_hallucination_free: bool,
    pub has_expected_keywords: bool,
    pub no_forbidden_terms: bool,
}

impl ValidationReport {
    /// Overall verdict. Hallucination cues are reported but do not fail a
    /// response on their own: government answers legitimately say "error"
    /// or "please consult".
    pub fn is_valid(&self) -> bool {
        self.is_meaningful
            && self.is_well_formatted
            && self.has_expected_keywords
            && self.no_forbidden_terms
    }
}

/// Run every response check against `expectations`.
pub fn validate_response(response: &str, expectations: &ResponseExpectations) -> ValidationReport {
    let report = ValidationReport {
        is_meaningful: is_meaningful_response(response, expectations.min_length),
        is_well_formatted: is_well_formatted(response),
        is_hallucination_free: is_hallucination_free(response),
        has_expected_keywords: expectations.expected_keywords.is_empty()
            || contains_keywords(response, &expectations.expected_keywords, 1),
        no_forbidden_terms: expectations.forbidden_terms.is_empty()
            || does_not_contain(response, &expectations.forbidden_terms),
    };
    info!("validation results: {:?}", report);
    report
}

//! Pure validators applied to text captured from the chatbot UI.
//!
//! Nothing in here touches a browser: every function takes strings and
//! returns a verdict, so suites can assert on captured text directly.

pub mod response;
pub mod security;
pub mod similarity;

pub use response::{
    contains_keywords, does_not_contain, formatting_issues, hallucination_indicators,
    is_hallucination_free, is_meaningful_response, is_well_formatted, keyword_matches,
    validate_response, ResponseExpectations, ValidationReport, DEFAULT_MIN_LENGTH,
};
pub use security::{
    check_prompt_injection_resistance, is_sql_injection_safe, is_xss_sanitized,
    sql_injection_patterns, xss_patterns_present,
};
pub use similarity::{are_semantically_similar, calculate_similarity, DEFAULT_SIMILARITY_THRESHOLD};

/// Truncate text for log output, appending `...` when cut.
///
/// Counts characters, not bytes, so Arabic responses never split mid-codepoint.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

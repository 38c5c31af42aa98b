//! Email pattern matching for credential records
//!
//! A pattern is either an exact email or contains `*` wildcards, each of
//! which matches any run of characters (including none). Matching is
//! case-insensitive and anchored at both ends.

use regex::RegexBuilder;

/// The pattern that matches every email
pub const UNIVERSAL_PATTERN: &str = "*";

/// Weight subtracted from a pattern's length for each wildcard it contains
const WILDCARD_PENALTY: i64 = 10;

/// Check whether `pattern` matches `email`
pub fn matches(pattern: &str, email: &str) -> bool {
    if pattern == UNIVERSAL_PATTERN || pattern.to_lowercase() == email.to_lowercase() {
        return true;
    }

    let anchored = format!(
        "^{}$",
        pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*")
    );

    match RegexBuilder::new(&anchored)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
    {
        Ok(re) => re.is_match(email),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Unusable credential pattern");
            false
        }
    }
}

/// Rank a pattern; higher means more specific
///
/// The universal pattern scores 0. Anything else scores its length minus
/// ten per wildcard, which puts exact emails ahead of domain wildcards and
/// domain wildcards ahead of `*` for realistic patterns.
pub fn specificity(pattern: &str) -> i64 {
    if pattern == UNIVERSAL_PATTERN {
        return 0;
    }
    let length = pattern.chars().count() as i64;
    let wildcards = pattern.matches('*').count() as i64;
    length - WILDCARD_PENALTY * wildcards
}

//! Email shape check used before any network call.

#[cfg(test)]
#[path = "email_test.rs"]
mod tests;

use std::sync::LazyLock;

use regex::Regex;

// local part, `@`, then dot-separated non-empty domain labels.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("email pattern is valid"));

/// Returns `true` when `candidate` looks like an email address.
pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_RE.is_match(candidate)
}

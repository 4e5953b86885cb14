//! Account identifier checks.

use regex::Regex;
use std::sync::LazyLock;

/// DNI (8 digits + letter) or NIE (X/Y/Z + 7 digits + letter).
static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]{8}|[XYZxyz][0-9]{7})[^0-9]$").expect("Invalid regex")
});

/// Quick check that a username looks like a NIF/DNI/NIE.
///
/// Only the shape is checked, not the control letter.
pub fn is_valid_username(username: &str) -> bool {
    username.chars().count() == 9 && USERNAME_RE.is_match(username)
}

/// Masks an identifier, keeping only its last three characters.
pub fn mask_identifier(identifier: &str) -> String {
    let chars: Vec<char> = identifier.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(3)..].iter().collect();
    format!("***{tail}")
}
